//! Correlation id for each request
//!
//! Taken from the `trace_id` header when the caller sends one, generated
//! otherwise. It is written back on the request and the response, stored in
//! the request extensions and kept in a task-local for the rest of the
//! request.

use crate::app::FrameState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use frame_core::consts::TRACE_ID_KEY;
use tracing::{info_span, Instrument};

/// Correlation id of the current request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    pub static CURRENT_TRACE_ID: TraceId;
}

/// Trace id of the request the current task is serving, if any
pub fn current() -> Option<String> {
    CURRENT_TRACE_ID.try_with(|id| id.0.clone()).ok()
}

/// A fresh id: base64 of the project name (`=` → `-`) followed by a UUID
pub fn generate_trace_id(project: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    if project.is_empty() {
        return id;
    }
    format!("{}{}", STANDARD.encode(project).replace('=', "-"), id)
}

/// The inbound header value, kept byte for byte; empty counts as missing
pub fn from_headers(headers: &HeaderMap) -> Option<HeaderValue> {
    headers
        .get(TRACE_ID_KEY)
        .filter(|v| !v.is_empty())
        .cloned()
}

/// String form of a header value for logs and extensions
pub fn lossy(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}

pub async fn propagate(State(state): State<FrameState>, mut req: Request, next: Next) -> Response {
    let (trace_id, header) = match from_headers(req.headers()) {
        Some(value) => (lossy(&value), Some(value)),
        None => {
            let id = generate_trace_id(&state.config.project);
            let value = HeaderValue::from_str(&id).ok();
            (id, value)
        }
    };

    if let Some(value) = header.clone() {
        req.headers_mut().insert(TRACE_ID_KEY, value);
    }
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut response = CURRENT_TRACE_ID
        .scope(TraceId(trace_id), next.run(req).instrument(span))
        .await;

    if let Some(value) = header {
        response.headers_mut().insert(TRACE_ID_KEY, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Backends;
    use axum::{body::Body, middleware::from_fn_with_state, routing::get, Extension, Router};
    use frame_core::Config;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let config = Config {
            project: "demo".into(),
            ..Default::default()
        };
        let state = FrameState::new(config, Arc::new(Backends::empty())).unwrap();
        Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<TraceId>| async move {
                    let local = current().unwrap_or_default();
                    format!("{}|{}", id.0, local)
                }),
            )
            .layer(from_fn_with_state(state.clone(), propagate))
            .with_state(state)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_generate_trace_id() {
        let id = generate_trace_id("demo");
        // "demo" is ZGVtbw== in base64
        assert!(id.starts_with("ZGVtbw--"));
        assert_eq!(id.len(), "ZGVtbw--".len() + 36);

        let bare = generate_trace_id("");
        assert_eq!(bare.len(), 36);
        assert_ne!(generate_trace_id("demo"), generate_trace_id("demo"));
    }

    #[tokio::test]
    async fn test_inbound_id_is_preserved() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(TRACE_ID_KEY, "caller-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[TRACE_ID_KEY], "caller-123");
        assert_eq!(body_text(response).await, "caller-123|caller-123");
    }

    #[tokio::test]
    async fn test_inbound_id_kept_byte_for_byte() {
        let raw = HeaderValue::from_bytes(b"caf\xe9-123").unwrap();
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(TRACE_ID_KEY, raw.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[TRACE_ID_KEY], raw);
        assert_eq!(body_text(response).await, "caf\u{fffd}-123|caf\u{fffd}-123");

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(TRACE_ID_KEY, "abc-1 ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[TRACE_ID_KEY], "abc-1 ");
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers()[TRACE_ID_KEY].to_str().unwrap().to_string();
        assert!(header.starts_with("ZGVtbw--"));
        assert_eq!(body_text(response).await, format!("{}|{}", header, header));
    }

    #[tokio::test]
    async fn test_empty_header_counts_as_missing() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(TRACE_ID_KEY, "")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(!response.headers()[TRACE_ID_KEY].is_empty());
    }

    #[test]
    fn test_current_outside_request() {
        assert!(current().is_none());
    }
}
