//! Sandsync CLI library.
//!
//! Drives the sandbox mirror against a local directory: a [`LocalDirRemote`]
//! stands in for the remote session and a [`ProbeRouterDetector`] resolves the
//! routing convention.

pub mod commands;
pub mod detector;
pub mod local;
pub mod output;

pub use detector::ProbeRouterDetector;
pub use local::LocalDirRemote;
pub use output::OutputFormat;
