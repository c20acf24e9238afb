//! Prometheus metrics
//!
//! One recorder per process. Durations are recorded in milliseconds.

use axum::{extract::State, routing::get, Router};
use frame_core::consts::DEFAULT_METRIC_PATH;
use frame_core::{FrameError, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Mutex;
use std::time::Duration;

pub const REQUEST_DURATION: &str = "request_duration_seconds";
pub const REQUEST_BUSINESS_COUNT: &str = "request_buss_count";
pub const SEND_REQUESTS_TOTAL: &str = "send_http_requests_total";
pub const SEND_REQUESTS_DURATION: &str = "send_http_requests_duration_seconds";

/// Histogram buckets, milliseconds
pub const DURATION_BUCKETS: [f64; 9] = [
    50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 20000.0,
];

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the global recorder on first call; later calls return the same
/// handle.
pub fn install() -> Result<PrometheusHandle> {
    let mut handle = HANDLE
        .lock()
        .map_err(|_| FrameError::Metrics("recorder lock poisoned".into()))?;
    if let Some(existing) = handle.as_ref() {
        return Ok(existing.clone());
    }

    let installed = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &DURATION_BUCKETS)
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full(SEND_REQUESTS_DURATION.to_string()),
                &DURATION_BUCKETS,
            )
        })
        .and_then(|b| b.install_recorder())
        .map_err(|e| FrameError::Metrics(e.to_string()))?;

    *handle = Some(installed.clone());
    Ok(installed)
}

/// The installed handle, if [`install`] has run
pub fn handle() -> Option<PrometheusHandle> {
    HANDLE.lock().ok().and_then(|h| h.clone())
}

/// Inbound request: latency by HTTP status, count by business code
pub fn record_request(url: &str, status: u16, bus_code: &str, method: &str, elapsed: Duration) {
    ::metrics::histogram!(
        REQUEST_DURATION,
        "url" => url.to_string(),
        "code" => status.to_string(),
        "method" => method.to_string()
    )
    .record(elapsed.as_secs_f64() * 1000.0);

    ::metrics::counter!(
        REQUEST_BUSINESS_COUNT,
        "url" => url.to_string(),
        "bus_code" => bus_code.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

/// Outbound call made through the traced HTTP client
pub fn record_send(method: &str, host: &str, path: &str, code: &str, elapsed: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("host", host.to_string()),
        ("path", path.to_string()),
        ("code", code.to_string()),
    ];
    ::metrics::counter!(SEND_REQUESTS_TOTAL, &labels).increment(1);
    ::metrics::histogram!(SEND_REQUESTS_DURATION, &labels).record(elapsed.as_secs_f64() * 1000.0);
}

/// Router serving the scrape endpoint
pub fn router<S>(handle: PrometheusHandle) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(DEFAULT_METRIC_PATH, get(render))
        .with_state(handle)
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_install_is_idempotent_and_renders() {
        let first = install().unwrap();
        let second = install().unwrap();
        assert!(handle().is_some());

        record_request("/users/:id", 200, "0", "GET", Duration::from_millis(120));
        record_send("GET", "example.com", "/v1/ping", "200", Duration::from_millis(30));

        let text = second.render();
        assert!(text.contains(REQUEST_BUSINESS_COUNT));
        assert!(text.contains("bus_code=\"0\""));
        assert!(text.contains(SEND_REQUESTS_TOTAL));
        assert!(first.render().contains(REQUEST_DURATION));

        let response = router::<()>(first)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
