//! Contracts for the remote sandbox and the collaborators the orchestrator consumes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use sandsync_core::{FileContent, Result, RouterConfig, SyncError};
use serde::{Deserialize, Serialize};

/// Kind of a raw change reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventType {
    Change,
    Rename,
}

/// Raw change notification from the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWatchEvent {
    pub event_type: WatchEventType,
    /// Path relative to the sandbox root, not necessarily normalized
    pub filename: String,
}

impl RemoteWatchEvent {
    pub fn change(filename: impl Into<String>) -> Self {
        Self {
            event_type: WatchEventType::Change,
            filename: filename.into(),
        }
    }

    pub fn rename(filename: impl Into<String>) -> Self {
        Self {
            event_type: WatchEventType::Rename,
            filename: filename.into(),
        }
    }
}

/// Stream of remote changes; ends when the remote stops watching.
pub type RemoteWatchStream = BoxStream<'static, Result<RemoteWatchEvent>>;

/// Filesystem of a remote sandbox session.
///
/// The store cannot delete or move, and it does not distinguish files from
/// directories: a path that can be listed is treated as a directory.
#[async_trait]
pub trait RemoteFileSystem: Send + Sync {
    /// Entry names directly under `path`; fails for anything that is not a directory.
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    /// Text content of a file.
    async fn read(&self, path: &str) -> Result<String>;

    /// Raw bytes of a file.
    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        Err(SyncError::unsupported(format!(
            "byte-level reads are not available for {}",
            path
        )))
    }

    async fn write(&self, path: &str, content: &FileContent) -> Result<()>;

    /// Subscribe to remote-originated changes.
    async fn watch(&self) -> Result<RemoteWatchStream>;

    /// Release the session.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Detects the web routing convention used by the sandbox.
#[async_trait]
pub trait RouterDetector: Send + Sync {
    async fn detect(&self, remote: &dyn RemoteFileSystem) -> Result<Option<RouterConfig>>;
}

/// Makes sure the editor's preload script is present in the sandbox.
#[async_trait]
pub trait PreloadScriptHook: Send + Sync {
    async fn ensure_preload_script(&self) -> Result<()>;
}

/// Hook that does nothing, for hosts without a preload script.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreloadHook;

#[async_trait]
impl PreloadScriptHook for NoopPreloadHook {
    async fn ensure_preload_script(&self) -> Result<()> {
        Ok(())
    }
}

/// Detector that always reports the same configuration.
#[derive(Debug, Clone, Default)]
pub struct FixedRouterDetector {
    config: Option<RouterConfig>,
}

impl FixedRouterDetector {
    pub fn new(config: Option<RouterConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RouterDetector for FixedRouterDetector {
    async fn detect(&self, _remote: &dyn RemoteFileSystem) -> Result<Option<RouterConfig>> {
        Ok(self.config.clone())
    }
}
