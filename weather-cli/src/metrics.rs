//! Prometheus metrics served on `/metrics`.

use std::{sync::Arc, time::Duration};

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    core::{Collector, Desc},
    proto::MetricFamily,
};
use weather_core::TtlCache;

const NAMESPACE: &str = "weather_reporter";

/// Registry holding the cache and HTTP request metrics of one server.
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl Metrics {
    pub fn new(cache: Arc<TtlCache>) -> prometheus::Result<Self> {
        let registry = Registry::new();
        registry.register(Box::new(CacheCollector::new(cache)?))?;

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "A counter for requests to the server.")
                .namespace(NAMESPACE),
            &["path", "method", "code"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let latency = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "A histogram of request latencies.")
                .namespace(NAMESPACE),
            &["path", "method"],
        )?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self { registry, requests, latency })
    }

    pub fn observe_request(&self, path: &str, method: &str, code: u16, elapsed: Duration) {
        self.requests
            .with_label_values(&[path, method, &code.to_string()])
            .inc();
        self.latency
            .with_label_values(&[path, method])
            .observe(elapsed.as_secs_f64());
    }

    /// Text exposition of everything in the registry.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Exports the cache's hit/miss counts as `weather_reporter_cache{state=..}`.
///
/// The counts live in the cache itself; they are copied into a fresh counter
/// vector on every scrape.
struct CacheCollector {
    cache: Arc<TtlCache>,
    opts: Opts,
    descs: Vec<Desc>,
}

impl CacheCollector {
    fn new(cache: Arc<TtlCache>) -> prometheus::Result<Self> {
        let opts = Opts::new("cache", "Counter of cache hits or misses.").namespace(NAMESPACE);
        let template = IntCounterVec::new(opts.clone(), &["state"])?;
        let descs = template.desc().into_iter().cloned().collect();
        Ok(Self { cache, opts, descs })
    }
}

impl Collector for CacheCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let stats = self.cache.stats();
        match IntCounterVec::new(self.opts.clone(), &["state"]) {
            Ok(counters) => {
                counters.with_label_values(&["hit"]).inc_by(stats.hits);
                counters.with_label_values(&["miss"]).inc_by(stats.misses);
                counters.collect()
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to build cache metric");
                Vec::new()
            }
        }
    }
}
