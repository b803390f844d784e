//! Ordered provider fallback backed by the weather cache.

use std::sync::Arc;

use crate::{
    cache::Cache,
    error::{ProviderError, WeatherError},
    model::Weather,
    provider::WeatherProvider,
};

/// Answers "what is the weather in `city` right now?".
///
/// Providers are tried in the order given at construction; the first success
/// is cached and returned. When every provider fails, a cached value that has
/// not expired is returned instead, without signalling that it may be stale.
#[derive(Debug, Clone)]
pub struct WeatherService {
    cache: Arc<dyn Cache>,
    providers: Vec<Arc<dyn WeatherProvider>>,
}

impl WeatherService {
    pub fn new(cache: Arc<dyn Cache>, providers: Vec<Arc<dyn WeatherProvider>>) -> Self {
        Self { cache, providers }
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.name())
    }

    /// # Errors
    ///
    /// [`WeatherError::NoProvidersConfigured`] when the provider list is empty
    /// (the cache is not consulted), and [`WeatherError::AllProvidersExhausted`]
    /// carrying the last provider's failure when every provider failed and the
    /// cache has nothing for `city`.
    pub async fn get_current_weather(&self, city: &str) -> Result<Weather, WeatherError> {
        tracing::debug!(city, "searching for weather");

        let Some((last, earlier)) = self.providers.split_last() else {
            return Err(WeatherError::NoProvidersConfigured);
        };

        for provider in earlier {
            if let Ok(weather) = self.query(provider.as_ref(), city).await {
                return Ok(weather);
            }
        }

        // only the last provider's failure is reported; earlier ones were logged
        let source = match self.query(last.as_ref(), city).await {
            Ok(weather) => return Ok(weather),
            Err(err) => err,
        };
        let err = WeatherError::AllProvidersExhausted {
            city: city.to_owned(),
            provider: last.name().to_owned(),
            source,
        };

        if let Some(weather) = self.cache.get(city) {
            tracing::warn!(
                city,
                error = %err,
                "failed to get weather from providers; cached result will be returned"
            );
            return Ok(weather);
        }

        Err(err)
    }

    /// Calls one provider, caching a success and logging a failure.
    async fn query(
        &self,
        provider: &dyn WeatherProvider,
        city: &str,
    ) -> Result<Weather, ProviderError> {
        match provider.get_weather(city).await {
            Ok(weather) => {
                self.cache.put(city, weather);
                Ok(weather)
            }
            Err(err) => {
                tracing::warn!(
                    city,
                    provider = provider.name(),
                    error = %err,
                    "failed to get weather from provider"
                );
                Err(err)
            }
        }
    }
}
