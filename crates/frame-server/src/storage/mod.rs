//! Storage layer
//!
//! MySQL pools (sqlx) and Redis connections, opened once from configuration
//! and looked up by name.

pub mod cache;
pub mod db;
pub mod registry;
pub mod tables;

pub use cache::{Cache, TracedCache};
pub use db::{Database, TracedDb};
pub use registry::{Backends, NamedRegistry, Registry};
pub use tables::{init_fn, Table, TableInitFn, TableRegistry};
