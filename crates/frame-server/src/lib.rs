//! frame server
//!
//! Web-service bootstrap on axum: one configuration file wires logging,
//! named MySQL and Redis connections, request tracing, JSON envelopes and
//! Prometheus metrics.

pub mod app;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod services;
pub mod storage;

pub use app::{App, FrameState};
pub use error::{AppError, AppResult};
pub use extractors::RequestContext;
pub use response::{BusinessError, Envelope, ErrorMsg, PageResults};
pub use services::{HttpClient, TracedHttpClient};
pub use storage::{init_fn, Table, TableInitFn, TracedCache, TracedDb};

pub use frame_core;
