use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::ProviderError,
    model::Weather,
    provider::{fetch_json, required_int},
};

use super::WeatherProvider;

const NAME: &str = "weatherapi";
const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

#[derive(Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for WeatherApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApiProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: Option<f64>,
    wind_kph: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: Option<WaCurrent>,
}

impl WaResponse {
    fn into_weather(self) -> Result<Weather, ProviderError> {
        let (temp, wind) = match self.current {
            Some(current) => (current.temp_c, current.wind_kph),
            None => (None, None),
        };

        Ok(Weather {
            wind_speed: required_int(NAME, "wind speed", wind)?,
            temperature_degrees: required_int(NAME, "temperature degrees", temp)?,
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn get_weather(&self, city: &str) -> Result<Weather, ProviderError> {
        let url = format!("{}/v1/current.json", self.base_url);
        let query = city.to_lowercase();
        tracing::debug!(provider = NAME, %url, city, "sending http request");

        let request = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", query.as_str())]);

        let parsed: WaResponse = fetch_json(NAME, request).await?;
        let weather = parsed.into_weather()?;

        tracing::debug!(provider = NAME, ?weather, "got weather data");
        Ok(weather)
    }
}
