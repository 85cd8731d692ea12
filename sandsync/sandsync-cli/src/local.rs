//! A local directory served through the [`RemoteFileSystem`] contract.
//!
//! Used by the CLI to drive the mirror against a checkout on disk. Change
//! notifications come from `notify` and are reported relative to the root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use sandsync_core::paths::normalize_path;
use sandsync_core::{FileContent, Result, SyncError};
use sandsync_vfs::{RemoteFileSystem, RemoteWatchEvent, RemoteWatchStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Directory on disk acting as the sandbox.
#[derive(Debug, Clone)]
pub struct LocalDirRemote {
    root: PathBuf,
}

impl LocalDirRemote {
    /// Serve `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|e| {
            SyncError::invalid_input(format!("Cannot open {}: {}", root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(SyncError::invalid_input(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a sandbox path. `..` cannot climb above the root.
    fn resolve(&self, path: &str) -> PathBuf {
        let relative = normalize_path(path);
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

/// Sandbox path of `absolute`, if it lies under `root`.
fn relative_to(root: &Path, absolute: &Path) -> Option<String> {
    let relative = absolute.strip_prefix(root).ok()?;
    let path = normalize_path(&relative.to_string_lossy());
    (!path.is_empty()).then_some(path)
}

/// Translate a notify event into change notifications, one per path.
fn convert_event(root: &Path, event: Event) -> Vec<RemoteWatchEvent> {
    let rename = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_)) => false,
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => true,
        EventKind::Modify(_) => false,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| relative_to(root, path))
        .map(|path| {
            if rename {
                RemoteWatchEvent::rename(path)
            } else {
                RemoteWatchEvent::change(path)
            }
        })
        .collect()
}

#[async_trait]
impl RemoteFileSystem for LocalDirRemote {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.resolve(path)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, path: &str) -> Result<String> {
        let location = self.resolve(path);
        tokio::fs::read_to_string(&location).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SyncError::not_found("File", normalize_path(path)),
            _ => SyncError::Io(e),
        })
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn write(&self, path: &str, content: &FileContent) -> Result<()> {
        let location = self.resolve(path);
        if location == self.root {
            return Err(SyncError::invalid_input("Cannot write to the sandbox root"));
        }
        if let Some(parent) = location.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match content {
            FileContent::Text(text) => tokio::fs::write(&location, text).await?,
            FileContent::Binary(bytes) => tokio::fs::write(&location, bytes).await?,
        }
        debug!("Wrote {}", location.display());
        Ok(())
    }

    async fn watch(&self) -> Result<RemoteWatchStream> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| SyncError::watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::watch(format!("Failed to watch {}: {}", self.root.display(), e)))?;

        let root = self.root.clone();
        let stream = async_stream::stream! {
            // Keeps the watcher alive for as long as the stream is polled
            let _watcher = watcher;
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for change in convert_event(&root, event) {
                            yield Ok(change);
                        }
                    }
                    Err(e) => {
                        warn!("File watcher error: {}", e);
                        yield Err(SyncError::watch(format!("File watcher error: {}", e)));
                    }
                }
            }
        };
        let stream: RemoteWatchStream = Box::pin(stream);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use sandsync_vfs::WatchEventType;
    use tempfile::TempDir;

    fn remote() -> (TempDir, LocalDirRemote) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(dir.path().join("app/page.tsx"), "export default () => <div />;").unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();
        let remote = LocalDirRemote::new(dir.path()).unwrap();
        (dir, remote)
    }

    #[tokio::test]
    async fn test_list_root_and_subdirectory() {
        let (_dir, remote) = remote();
        assert_eq!(remote.list(".").await.unwrap(), vec!["README.md", "app"]);
        assert_eq!(remote.list("app").await.unwrap(), vec!["page.tsx"]);
        assert!(remote.list("README.md").await.is_err());
        assert!(remote.list("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let (dir, remote) = remote();
        assert_eq!(remote.read("./README.md").await.unwrap(), "# readme");
        assert!(remote.read("missing.md").await.unwrap_err().is_not_found());

        remote
            .write("src/new/file.ts", &FileContent::Text("export {};".into()))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/new/file.ts")).unwrap(),
            "export {};"
        );

        remote
            .write("logo.png", &FileContent::Binary(vec![0, 1, 2]))
            .await
            .unwrap();
        assert_eq!(remote.read_bytes("logo.png").await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_paths_stay_under_root() {
        let (dir, remote) = remote();
        remote
            .write("../../escape.txt", &FileContent::Text("x".into()))
            .await
            .unwrap();
        assert!(dir.path().join("escape.txt").exists());
        assert!(remote.write("", &FileContent::Text("x".into())).await.is_err());
    }

    #[test]
    fn test_rejects_missing_root() {
        assert!(LocalDirRemote::new("/definitely/not/here").is_err());
    }

    #[test]
    fn test_convert_event() {
        let root = Path::new("/sandbox");
        let event = |kind| Event::new(kind).add_path(PathBuf::from("/sandbox/app/page.tsx"));

        let changes = convert_event(root, event(EventKind::Create(CreateKind::File)));
        assert_eq!(changes, vec![RemoteWatchEvent::change("app/page.tsx")]);

        let changes = convert_event(
            root,
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
        );
        assert_eq!(changes[0].event_type, WatchEventType::Change);

        let changes = convert_event(root, event(EventKind::Remove(RemoveKind::File)));
        assert_eq!(changes[0].event_type, WatchEventType::Rename);

        let changes = convert_event(
            root,
            event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                .add_path(PathBuf::from("/sandbox/app/home.tsx")),
        );
        assert_eq!(
            changes,
            vec![
                RemoteWatchEvent::rename("app/page.tsx"),
                RemoteWatchEvent::rename("app/home.tsx"),
            ]
        );

        let outside = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/elsewhere/x.ts"));
        assert!(convert_event(root, outside).is_empty());
        assert!(convert_event(root, event(EventKind::Access(notify::event::AccessKind::Any))).is_empty());
    }
}
