use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::ProviderError,
    model::{Weather, mps_to_kmh},
    provider::{fetch_json, required_int},
};

use super::WeatherProvider;

const NAME: &str = "openweather";
const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http }
    }

    /// Point the provider at another host, e.g. a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for OpenWeatherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: Option<OwMain>,
    wind: Option<OwWind>,
}

impl OwCurrentResponse {
    /// `units=metric` gives °C and m/s.
    fn into_weather(self) -> Result<Weather, ProviderError> {
        let temp = self.main.and_then(|main| main.temp);
        let speed = self.wind.and_then(|wind| wind.speed);

        Ok(Weather {
            wind_speed: required_int(NAME, "wind speed", speed.map(mps_to_kmh))?,
            temperature_degrees: required_int(NAME, "temperature degrees", temp)?,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn get_weather(&self, city: &str) -> Result<Weather, ProviderError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        let query = city.to_lowercase();
        tracing::debug!(provider = NAME, %url, city, "sending http request");

        let request = self.http.get(&url).query(&[
            ("appid", self.api_key.as_str()),
            ("q", query.as_str()),
            ("units", "metric"),
        ]);

        let parsed: OwCurrentResponse = fetch_json(NAME, request).await?;
        let weather = parsed.into_weather()?;

        tracing::debug!(provider = NAME, ?weather, "got weather data");
        Ok(weather)
    }
}
