//! Local mirror of a remote sandbox filesystem.
//!
//! This crate provides:
//! - [`FileCache`]: in-memory mirror of files and directories
//! - [`EventBus`]: change notifications for in-process subscribers
//! - [`SyncOrchestrator`]: indexing, read/write-through and change-stream handling
//! - the [`RemoteFileSystem`] contract a sandbox session implements

pub mod event_bus;
pub mod file_cache;
pub mod orchestrator;
pub mod remote;
pub mod types;
pub mod watch;

pub use event_bus::{EventBus, EventFilter, SubscriptionToken};
pub use file_cache::FileCache;
pub use orchestrator::SyncOrchestrator;
pub use remote::{
    FixedRouterDetector, NoopPreloadHook, PreloadScriptHook, RemoteFileSystem, RemoteWatchEvent,
    RemoteWatchStream, RouterDetector, WatchEventType,
};
pub use types::{DirEntryInfo, DirEntryType, IndexOutcome, IndexReport};
pub use watch::WatchTask;
