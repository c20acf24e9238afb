//! HTTP middleware

pub mod cors;
pub mod request_log;
pub mod trace_id;

pub use trace_id::{generate_trace_id, TraceId};
