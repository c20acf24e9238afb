//! JSON response envelopes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use frame_core::consts::{SUCCESS_CODE, SUCCESS_MSG};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Business code returned for failures that carry no code of their own
pub const INTERNAL_CODE: &str = "FRAME_INTERNAL";

/// Body of every JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub time: String,
}

impl<T> Envelope<T> {
    pub fn new(code: impl Into<String>, request_id: impl Into<String>, data: Option<T>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            request_id: request_id.into(),
            data,
            message: message.into(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResults<T> {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    #[serde(default)]
    pub results: Vec<T>,
}

impl<T> PageResults<T> {
    pub fn new(total: u64, page: u64, page_size: u64, results: Vec<T>) -> Self {
        Self {
            total,
            page,
            page_size,
            results,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, 0, 0, Vec::new())
    }
}

impl<T> Default for PageResults<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A failure that can be reported to a caller.
///
/// `reply` goes into the response, `real` only into the log.
pub trait ErrorMsg {
    fn code(&self) -> &str;
    fn real(&self) -> &str;
    fn reply(&self) -> &str;
}

/// Stock [`ErrorMsg`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessError {
    code: String,
    reply: String,
    real: String,
}

impl BusinessError {
    pub fn new(code: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reply: reply.into(),
            real: String::new(),
        }
    }

    pub fn with_real(mut self, real: impl Into<String>) -> Self {
        self.real = real.into();
        self
    }
}

impl ErrorMsg for BusinessError {
    fn code(&self) -> &str {
        &self.code
    }

    fn real(&self) -> &str {
        &self.real
    }

    fn reply(&self) -> &str {
        &self.reply
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.reply)
    }
}

impl std::error::Error for BusinessError {}

/// 200 with data
pub fn success<T: Serialize>(trace_id: &str, data: T) -> Response {
    let body = Envelope::new(SUCCESS_CODE, trace_id, Some(data), SUCCESS_MSG);
    (StatusCode::OK, Json(body)).into_response()
}

/// Error envelope with the given HTTP status
pub fn failure(trace_id: &str, status: StatusCode, err: &dyn ErrorMsg) -> Response {
    log_real_reason(trace_id, err.real());
    let body: Envelope<()> = Envelope::new(err.code(), trace_id, None, err.reply());
    (status, Json(body)).into_response()
}

/// 200 with a page; a page is always present, possibly empty
pub fn list_success<T: Serialize>(trace_id: &str, page: PageResults<T>) -> Response {
    success(trace_id, page)
}

/// Error envelope carrying an empty page
pub fn list_failure(trace_id: &str, status: StatusCode, err: &dyn ErrorMsg) -> Response {
    log_real_reason(trace_id, err.real());
    let body = Envelope::new(
        err.code(),
        trace_id,
        Some(PageResults::<serde_json::Value>::empty()),
        err.reply(),
    );
    (status, Json(body)).into_response()
}

fn log_real_reason(trace_id: &str, real: &str) {
    if !real.is_empty() {
        error!(trace_id = %trace_id, mode = "real_reason", msg = %real, "request failed");
    }
}
