//! Core library for the `weather` reporter.
//!
//! This crate defines:
//! - The canonical [`Weather`] value and the provider abstraction producing it
//! - An in-memory TTL cache used to ride out provider outages
//! - [`WeatherService`], which queries providers in order and falls back to the cache
//! - Configuration & credentials handling
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod service;

pub use cache::{Cache, CacheStats, TtlCache};
pub use config::{Config, ProviderConfig};
pub use error::{ProviderError, WeatherError};
pub use model::Weather;
pub use provider::{ProviderId, WeatherProvider, providers_from_config};
pub use service::WeatherService;
