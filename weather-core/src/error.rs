use reqwest::StatusCode;

/// Failure of a single provider call.
///
/// The service treats every variant the same way (fall through to the next
/// provider); the split exists for diagnostics and tests.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider}: failed to send request: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: request failed with status {status}: {body}")]
    Status {
        provider: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{provider}: failed to parse JSON response: {source}")]
    Parse {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider}: failed to extract {field} from response")]
    MissingField { provider: &'static str, field: &'static str },

    #[error("{provider}: {field} value {value} cannot be represented")]
    InvalidValue {
        provider: &'static str,
        field: &'static str,
        value: f64,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by [`WeatherService::get_current_weather`](crate::WeatherService::get_current_weather).
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("no providers configured")]
    NoProvidersConfigured,

    #[error("failed to get {city} weather from providers (last tried {provider}): {source}")]
    AllProvidersExhausted {
        city: String,
        provider: String,
        #[source]
        source: ProviderError,
    },
}
