use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::ProviderId;

pub const DEFAULT_HTTP_CLIENT_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 60;
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 64;

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// provider_order = ["openweather", "weatherapi"]
/// http_client_timeout_secs = 2
/// cache_expiration_secs = 60
/// http_port = 8080
/// max_concurrent_lookups = 64
///
/// [providers.openweather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Providers in the order they are queried.
    pub provider_order: Vec<String>,

    pub providers: HashMap<String, ProviderConfig>,

    pub http_client_timeout_secs: u64,

    pub cache_expiration_secs: u64,

    /// Port `weather serve` listens on.
    pub http_port: u16,

    /// Upper bound on weather lookups running at once in `weather serve`.
    pub max_concurrent_lookups: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_order: Vec::new(),
            providers: HashMap::new(),
            http_client_timeout_secs: DEFAULT_HTTP_CLIENT_TIMEOUT_SECS,
            cache_expiration_secs: DEFAULT_CACHE_EXPIRATION_SECS,
            http_port: DEFAULT_HTTP_PORT,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
        }
    }
}

impl Config {
    /// Configured provider order as strongly-typed ids. Duplicates are dropped.
    pub fn provider_order_ids(&self) -> Result<Vec<ProviderId>> {
        let mut ids: Vec<ProviderId> = Vec::with_capacity(self.provider_order.len());
        for name in &self.provider_order {
            let id = ProviderId::try_from(name.as_str())
                .with_context(|| format!("Invalid entry in provider_order: '{name}'"))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn http_client_timeout(&self) -> Duration {
        Duration::from_secs(self.http_client_timeout_secs)
    }

    pub fn cache_expiration(&self) -> Duration {
        Duration::from_secs(self.cache_expiration_secs)
    }

    /// Load config from the platform config directory, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-reporter", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set/replace a provider API key; a provider seen for the first time is queried last.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });

        let listed = self
            .provider_order
            .iter()
            .any(|name| ProviderId::try_from(name.as_str()).is_ok_and(|id| id == provider_id));
        if !listed {
            self.provider_order.push(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some_and(|key| !key.trim().is_empty())
    }
}
