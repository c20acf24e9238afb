//! frame - Core Library
//!
//! Configuration model, loading, default filling and validation, plus the
//! error type shared by every frame crate.

pub mod config;
pub mod consts;
pub mod error;
pub mod types;

pub use self::config::*;
pub use self::error::*;
pub use self::types::*;
