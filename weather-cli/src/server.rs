//! HTTP transport for `weather serve`.
//!
//! - `GET /v1/weather?city=<name>`: JSON weather, or 500 with the error text
//! - `GET /health`: liveness
//! - `GET /metrics`: Prometheus text exposition

use std::{future::Future, net::SocketAddr, sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{ConnectInfo, MatchedPath, Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::Semaphore};
use weather_core::WeatherService;

use crate::metrics::Metrics;

/// Paths that are served but not logged.
const QUIET_PATHS: &[&str] = &["/health", "/metrics"];

#[derive(Clone)]
pub struct AppState {
    service: WeatherService,
    lookups: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// `max_concurrent_lookups` bounds lookups in flight; further requests wait.
    pub fn new(service: WeatherService, max_concurrent_lookups: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            service,
            lookups: Arc::new(Semaphore::new(max_concurrent_lookups.max(1))),
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/weather", get(current_weather))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

/// Serves on `listener` until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("failed to read listener address")?;
    tracing::info!(%addr, "starting http server");

    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;

    tracing::info!("http server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!(signal = "SIGINT", "shutdown signal received"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "shutdown signal received"),
    }
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    city: Option<String>,
}

async fn current_weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Response {
    let Some(city) = query
        .city
        .map(|city| city.trim().to_owned())
        .filter(|city| !city.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "missing city query parameter").into_response();
    };

    let Ok(permit) = Arc::clone(&state.lookups).acquire_owned().await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    };

    // A panicking lookup must still produce a response for this city.
    let service = state.service.clone();
    let lookup = tokio::spawn({
        let city = city.clone();
        async move {
            let _permit = permit;
            service.get_current_weather(&city).await
        }
    });

    match lookup.await {
        Ok(Ok(weather)) => Json(weather).into_response(),
        Ok(Err(err)) => error_response(anyhow::Error::new(err).context("failed to retrieve data")),
        Err(err) => error_response(anyhow::anyhow!("weather lookup for {city} did not complete: {err}")),
    }
}

fn error_response(err: anyhow::Error) -> Response {
    let message = format!("{err:#}");
    tracing::error!(error = %message, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "SERVING" }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => error_response(err.context("failed to encode metrics")),
    }
}

async fn log_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str)
        .to_owned();
    let method = request.method().clone();
    let request_ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();
    let status = response.status();

    state
        .metrics
        .observe_request(&route, method.as_str(), status.as_u16(), elapsed);

    if !QUIET_PATHS.contains(&path.as_str()) {
        tracing::info!(
            elapsed_time = ?elapsed,
            request_ip = %request_ip,
            request_path = %path,
            status_code = status.as_u16(),
            "request"
        );
    }
    response
}

/// Proxy headers first, then the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::{sync::oneshot, task::JoinHandle};
    use weather_core::{Cache, ProviderError, TtlCache, Weather, WeatherProvider};

    #[derive(Debug)]
    enum Behaviour {
        Ok(Weather),
        Fail(&'static str),
        Panic,
        Slow(Duration, Weather),
    }

    #[derive(Debug)]
    struct StubProvider {
        behaviour: Behaviour,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubProvider {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { behaviour, in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl WeatherProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn get_weather(&self, city: &str) -> Result<Weather, ProviderError> {
            match self.behaviour {
                Behaviour::Ok(weather) => Ok(weather),
                Behaviour::Fail(message) => Err(ProviderError::Other(message.to_string())),
                Behaviour::Panic => panic!("provider blew up for {city}"),
                Behaviour::Slow(delay, weather) => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(weather)
                }
            }
        }
    }

    struct TestServer {
        base: String,
        cache: Arc<TtlCache>,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<anyhow::Result<()>>,
    }

    impl TestServer {
        async fn start(provider: Arc<StubProvider>, ttl: Duration, max_lookups: usize) -> Self {
            let cache = Arc::new(TtlCache::new(ttl));
            let service = WeatherService::new(
                cache.clone(),
                vec![provider as Arc<dyn WeatherProvider>],
            );
            let metrics = Arc::new(Metrics::new(cache.clone()).expect("metrics"));
            let state = AppState::new(service, max_lookups, metrics);

            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let base = format!("http://{}", listener.local_addr().expect("addr"));
            let (stop, stopped) = oneshot::channel::<()>();
            let handle = tokio::spawn(serve(listener, state, async {
                stopped.await.ok();
            }));

            Self { base, cache, stop, handle }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.base)
        }

        async fn stop(self) {
            self.stop.send(()).ok();
            tokio::time::timeout(Duration::from_secs(5), self.handle)
                .await
                .expect("server should stop")
                .expect("server task")
                .expect("server result");
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn returns_weather_as_json() {
        let server = TestServer::start(StubProvider::new(Behaviour::Ok(Weather::new(12, 18))), TTL, 4).await;

        let res = reqwest::get(server.url("/v1/weather?city=paris")).await.unwrap();

        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "wind_speed": 12, "temperature_degrees": 18 }));
        assert_eq!(server.cache.get("paris"), Some(Weather::new(12, 18)));
        server.stop().await;
    }

    #[tokio::test]
    async fn huge_cache_ttl_still_answers() {
        let provider = StubProvider::new(Behaviour::Ok(Weather::new(1, 2)));
        let server = TestServer::start(provider, Duration::from_secs(u64::MAX), 4).await;

        let res = reqwest::get(server.url("/v1/weather?city=paris")).await.unwrap();

        assert_eq!(res.status(), reqwest::StatusCode::OK);
        server.stop().await;
    }

    #[tokio::test]
    async fn failure_is_reported_as_500_with_error_text() {
        let server = TestServer::start(StubProvider::new(Behaviour::Fail("rate limited")), TTL, 4).await;

        let res = reqwest::get(server.url("/v1/weather?city=paris")).await.unwrap();

        assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body = res.text().await.unwrap();
        assert!(body.starts_with("failed to retrieve data"));
        assert!(body.contains("paris"));
        assert!(body.contains("rate limited"));
        server.stop().await;
    }

    #[tokio::test]
    async fn cached_value_is_served_when_provider_fails() {
        let server = TestServer::start(StubProvider::new(Behaviour::Fail("timeout")), TTL, 4).await;
        server.cache.put("paris", Weather::new(5, 10));

        let res = reqwest::get(server.url("/v1/weather?city=paris")).await.unwrap();

        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "wind_speed": 5, "temperature_degrees": 10 }));
        server.stop().await;
    }

    #[tokio::test]
    async fn panicking_lookup_still_gets_an_answer() {
        let server = TestServer::start(StubProvider::new(Behaviour::Panic), TTL, 1).await;

        // the single permit is released with each failed task
        for _ in 0..2 {
            let res = reqwest::get(server.url("/v1/weather?city=paris")).await.unwrap();
            assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
            assert!(res.text().await.unwrap().contains("weather lookup for paris did not complete"));
        }
        server.stop().await;
    }

    #[tokio::test]
    async fn missing_or_blank_city_is_rejected() {
        let server = TestServer::start(StubProvider::new(Behaviour::Ok(Weather::default())), TTL, 4).await;

        for path in ["/v1/weather", "/v1/weather?city=", "/v1/weather?city=%20%20"] {
            let res = reqwest::get(server.url(path)).await.unwrap();
            assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST, "{path}");
        }
        server.stop().await;
    }

    #[tokio::test]
    async fn health_reports_serving() {
        let server = TestServer::start(StubProvider::new(Behaviour::Ok(Weather::default())), TTL, 4).await;

        let body: serde_json::Value =
            reqwest::get(server.url("/health")).await.unwrap().json().await.unwrap();

        assert_eq!(body, serde_json::json!({ "status": "SERVING" }));
        server.stop().await;
    }

    #[tokio::test]
    async fn metrics_expose_cache_hits_and_requests() {
        let server = TestServer::start(StubProvider::new(Behaviour::Fail("timeout")), TTL, 4).await;
        server.cache.put("paris", Weather::new(5, 10));

        reqwest::get(server.url("/v1/weather?city=paris")).await.unwrap();
        reqwest::get(server.url("/v1/weather?city=oslo")).await.unwrap();
        let res = reqwest::get(server.url("/metrics")).await.unwrap();

        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let text = res.text().await.unwrap();
        assert!(text.contains(r#"weather_reporter_cache{state="hit"} 1"#));
        assert!(text.contains(r#"weather_reporter_cache{state="miss"} 1"#));
        assert!(text.contains("weather_reporter_http_requests_total{"));
        server.stop().await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_lookups() {
        let provider = StubProvider::new(Behaviour::Slow(Duration::from_millis(300), Weather::new(3, 4)));
        let server = TestServer::start(provider.clone(), TTL, 4).await;

        let pending = tokio::spawn(reqwest::get(server.url("/v1/weather?city=paris")));
        while provider.in_flight.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let cache = server.cache.clone();
        server.stop().await;

        let res = pending.await.unwrap().unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(cache.get("paris"), Some(Weather::new(3, 4)));
    }

    #[tokio::test]
    async fn concurrent_lookups_are_bounded() {
        let provider = StubProvider::new(Behaviour::Slow(Duration::from_millis(100), Weather::new(1, 1)));
        let server = TestServer::start(provider.clone(), TTL, 2).await;

        let requests = (0..6).map(|i| reqwest::get(server.url(&format!("/v1/weather?city=city{i}"))));
        let mut tasks = Vec::new();
        for request in requests {
            tasks.push(tokio::spawn(request));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().status(), reqwest::StatusCode::OK);
        }

        let peak = provider.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {peak}");
        server.stop().await;
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000)));

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(&peer)), "10.0.0.1");

        headers.insert("x-real-ip", "192.168.1.2".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(&peer)), "192.168.1.2");

        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        assert_eq!(client_ip(&headers, None), "203.0.113.7");

        assert_eq!(client_ip(&HeaderMap::new(), None), "");
    }
}
