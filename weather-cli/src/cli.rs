use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use tokio::net::TcpListener;
use weather_core::{Config, ProviderId, TtlCache, WeatherService, providers_from_config};

use crate::{
    logging::LogFormat,
    metrics::Metrics,
    server::{self, AppState},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Current weather with provider fallback")]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that override the stored configuration for this run.
#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// Timeout for provider HTTP requests, in seconds.
    #[arg(long, global = true, env = "WEATHER_HTTP_CLIENT_TIMEOUT")]
    pub http_client_timeout: Option<u64>,

    /// How long a successful result may be served from cache, in seconds.
    #[arg(long, global = true, env = "WEATHER_CACHE_EXPIRATION")]
    pub cache_expiration: Option<u64>,

    /// Port the HTTP server listens on (`serve` only).
    #[arg(long, global = true, env = "WEATHER_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Maximum number of weather lookups the server runs at once.
    #[arg(long, global = true, env = "WEATHER_MAX_CONCURRENT_LOOKUPS")]
    pub max_concurrent_lookups: Option<usize>,

    #[arg(long, global = true, value_enum, default_value_t, env = "WEATHER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Enable debug logging.
    #[arg(long, global = true, env = "WEATHER_DEBUG")]
    pub debug: bool,
}

impl GlobalOptions {
    fn apply(&self, config: &mut Config) {
        if let Some(secs) = self.http_client_timeout {
            config.http_client_timeout_secs = secs;
        }
        if let Some(secs) = self.cache_expiration {
            config.cache_expiration_secs = secs;
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if let Some(limit) = self.max_concurrent_lookups {
            config.max_concurrent_lookups = limit;
        }
    }

    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load()?;
        self.apply(&mut config);
        tracing::debug!(
            http_client_timeout_secs = config.http_client_timeout_secs,
            cache_expiration_secs = config.cache_expiration_secs,
            http_port = config.http_port,
            max_concurrent_lookups = config.max_concurrent_lookups,
            "application config"
        );
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key for a provider and add it to the query order.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Print the current weather for a city as JSON.
    Show { city: String },

    /// Run the HTTP server until Ctrl-C or SIGTERM.
    Serve,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show { city } => {
                let (service, _cache) = build_service(&self.options.load_config()?)?;
                let city = city.trim();
                let weather = service
                    .get_current_weather(city)
                    .await
                    .with_context(|| format!("failed to retrieve weather for {city}"))?;
                println!("{}", serde_json::to_string(&weather)?);
                Ok(())
            }
            Command::Serve => serve(&self.options.load_config()?).await,
        }
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let (service, cache) = build_service(config)?;
    let sweeper = cache.spawn_sweeper();
    tracing::info!(ttl = ?cache.ttl(), "weather cache ready");

    let metrics = Arc::new(Metrics::new(cache.clone())?);
    let state = AppState::new(service, config.max_concurrent_lookups, metrics);
    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;

    let result = server::serve(listener, state, server::shutdown_signal()).await;
    sweeper.abort();
    tracing::info!(stats = ?cache.stats(), "weather cache closed");
    result
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        anyhow::bail!("API key for '{id}' must not be empty");
    }

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    let path = config.save()?;
    println!("Saved {id} credentials to {}", path.display());
    Ok(())
}

fn build_service(config: &Config) -> anyhow::Result<(WeatherService, Arc<TtlCache>)> {
    let providers = providers_from_config(config)?;
    if providers.is_empty() {
        tracing::warn!("no weather providers configured; run `weather configure <provider>`");
    }

    let cache = Arc::new(TtlCache::new(config.cache_expiration()));
    let service = WeatherService::new(cache.clone(), providers);
    Ok((service, cache))
}
