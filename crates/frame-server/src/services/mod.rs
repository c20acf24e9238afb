//! Services shared by handlers

pub mod http_client;

pub use http_client::{HttpClient, TracedHttpClient};
