use crate::{
    Config, Weather,
    error::ProviderError,
    model::round_to_int,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc, time::Duration};

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// A source of current weather for a city.
///
/// Implementations return values already normalized to [`Weather`] units
/// (km/h, whole degrees Celsius). Timeouts belong to the implementation's
/// own transport.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Short name used in logs and error context.
    fn name(&self) -> &str;

    async fn get_weather(&self, city: &str) -> Result<Weather, ProviderError>;
}

/// HTTP client shared by all providers, with the configured request timeout.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config
        .provider_api_key(id)
        .filter(|_| config.is_provider_configured(id))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured for provider '{id}'.\n\
                 Hint: run `weather configure {id}` and enter your API key."
            )
        })?;

    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::new(http, api_key.to_owned())),
        ProviderId::WeatherApi => Arc::new(WeatherApiProvider::new(http, api_key.to_owned())),
    };

    Ok(provider)
}

/// Build every provider listed in `provider_order`, in that order.
///
/// Providers without an API key are skipped with a warning; an empty result is
/// not an error here, the service reports it on first use.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Vec<Arc<dyn WeatherProvider>>> {
    let http = http_client(config.http_client_timeout())?;
    let mut providers = Vec::new();

    for id in config.provider_order_ids()? {
        match provider_from_config(id, config, http.clone()) {
            Ok(provider) => providers.push(provider),
            Err(err) => tracing::warn!(provider = %id, "skipping provider: {err}"),
        }
    }

    tracing::debug!(
        providers = ?providers.iter().map(|p| p.name().to_owned()).collect::<Vec<_>>(),
        "configured weather providers"
    );
    Ok(providers)
}

/// Sends `request`, checks the status and decodes the JSON body into `T`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let res = request
        .send()
        .await
        .map_err(|source| ProviderError::Request { provider, source })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| ProviderError::Request { provider, source })?;

    if !status.is_success() {
        return Err(ProviderError::Status { provider, status, body: truncate_body(&body) });
    }

    serde_json::from_str(&body).map_err(|source| ProviderError::Parse { provider, source })
}

/// Rounds a required numeric field, turning absence or garbage into a provider error.
pub(crate) fn required_int(
    provider: &'static str,
    field: &'static str,
    value: Option<f64>,
) -> Result<i64, ProviderError> {
    let value = value.ok_or(ProviderError::MissingField { provider, field })?;
    round_to_int(value).ok_or(ProviderError::InvalidValue { provider, field, value })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
