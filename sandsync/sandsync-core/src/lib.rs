//! Core types and configuration for the sandbox sync engine.
//!
//! This crate provides the error type, configuration, path helpers and the
//! shared data model used by the mapper and the mirroring engine.

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{ConfigProfile, SyncConfig};
pub use error::{Result, SyncError};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigProfile, SyncConfig};
    pub use crate::error::{Result, SyncError};
    pub use crate::paths::normalize_path;
    pub use crate::types::*;
}
