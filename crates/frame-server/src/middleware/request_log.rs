//! Request log and request metrics for the business router
//!
//! Only JSON responses are looked at: their business `code` and `message`
//! feed one log line and the request metrics. Anything else passes through.

use super::trace_id::TraceId;
use crate::app::FrameState;
use crate::metrics;
use crate::response::{self, BusinessError};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{error, info};

pub async fn record(State(state): State<FrameState>, req: Request, next: Next) -> Response {
    let log_requests = !state.config.http_server.disable_req_log;
    if !log_requests && !state.config.enable_metric {
        return next.run(req).await;
    }

    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let url = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    // Only the log line needs the request body
    let (req, request_body) = if log_requests {
        let (parts, body) = req.into_parts();
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => (Request::from_parts(parts, Body::from(bytes.clone())), bytes),
            Err(e) => {
                let err = BusinessError::new("BAD_REQUEST_BODY", "failed to read request body")
                    .with_real(e.to_string());
                return response::failure(&trace_id, StatusCode::BAD_REQUEST, &err);
            }
        }
    } else {
        (req, Bytes::new())
    };

    let response = next.run(req).await;
    if !is_json(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let response_body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(trace_id = %trace_id, path = %path, error = %e, "Failed to read response body");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let (code, message) = extract_code_message(&response_body);
    let elapsed = start.elapsed();

    if state.config.enable_metric {
        metrics::record_request(&url, parts.status.as_u16(), &code, method.as_str(), elapsed);
    }

    if log_requests {
        info!(
            trace_id = %trace_id,
            code = %code,
            status = parts.status.as_u16(),
            duration = elapsed.as_millis() as u64,
            msg = %message,
            method = %method,
            path = %path,
            req = %String::from_utf8_lossy(&request_body),
            resp = %String::from_utf8_lossy(&response_body),
            "request"
        );
    }

    Response::from_parts(parts, Body::from(response_body))
}

/// `application/json` and `+json` media types
fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let media = v.split(';').next().unwrap_or_default().trim();
            media.contains("application/json") || media.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Business `code` and `message` of a JSON envelope; numbers become strings
pub fn extract_code_message(body: &Bytes) -> (String, String) {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return (String::new(), String::new()),
    };
    let field = |name: &str| match value.get(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    (field("code"), field("message"))
}
