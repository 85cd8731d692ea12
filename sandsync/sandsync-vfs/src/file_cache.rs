//! In-memory mirror of the sandbox filesystem.
//!
//! Entries are keyed by normalized path. Directories live in a separate set so
//! a path can be known as a directory without holding any content. The cache
//! never evicts; it only changes through the operations below.

use std::future::Future;

use dashmap::{DashMap, DashSet};
use sandsync_core::paths::normalize_path;
use sandsync_core::{FileContent, FileKind, Result, SandboxFile};
use tracing::{debug, warn};

/// Thread-safe cache of mirrored files and known directories.
#[derive(Debug, Default)]
pub struct FileCache {
    files: DashMap<String, SandboxFile>,
    directories: DashSet<String>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for `path`, or the result of `fetch` stored for next time.
    ///
    /// A failed fetch is logged and yields `None`; misses are not cached.
    pub async fn read_or_fetch<F, Fut>(&self, path: &str, fetch: F) -> Option<SandboxFile>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<SandboxFile>>,
    {
        let path = normalize_path(path);
        if let Some(entry) = self.files.get(&path) {
            return Some(entry.clone());
        }

        match fetch(path.clone()).await {
            Ok(mut file) => {
                file.path = path.clone();
                self.files.insert(path, file.clone());
                Some(file)
            }
            Err(e) if e.is_not_connected() => {
                debug!("Cache miss for {} without a session", path);
                None
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", path, e);
                None
            }
        }
    }

    /// Write through `remote_write`, updating the entry only if it succeeded.
    pub async fn write<F, Fut>(&self, path: &str, content: FileContent, remote_write: F) -> bool
    where
        F: FnOnce(SandboxFile) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let file = SandboxFile {
            path: normalize_path(path),
            content,
        };

        match remote_write(file.clone()).await {
            Ok(()) => {
                debug!("Wrote {} ({} bytes)", file.path, file.content.len());
                self.files.insert(file.path.clone(), file);
                true
            }
            Err(e) => {
                warn!("Remote write of {} failed, cache left unchanged: {}", file.path, e);
                false
            }
        }
    }

    /// Overwrite the entry unconditionally.
    pub fn update_cache(&self, mut file: SandboxFile) {
        file.path = normalize_path(&file.path);
        self.files.insert(file.path.clone(), file);
    }

    /// Record a placeholder for content that has not been transferred.
    pub fn write_empty_file(&self, path: &str, kind: FileKind) {
        let path = normalize_path(path);
        self.files
            .insert(path.clone(), SandboxFile::placeholder(path, kind));
    }

    pub fn update_directory_cache(&self, path: &str) {
        let path = normalize_path(path);
        if !path.is_empty() {
            self.directories.insert(path);
        }
    }

    pub fn read_cache(&self, path: &str) -> Option<SandboxFile> {
        self.files.get(&normalize_path(path)).map(|entry| entry.clone())
    }

    pub fn contains_directory(&self, path: &str) -> bool {
        self.directories.contains(&normalize_path(path))
    }

    /// Remove `path` from both namespaces, plus everything beneath it when it
    /// is a known directory. Returns whether anything was removed.
    pub fn delete(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let mut removed = self.files.remove(&path).is_some();

        if self.directories.remove(&path).is_some() {
            removed = true;
            let prefix = format!("{}/", path);
            self.files.retain(|key, _| !key.starts_with(&prefix));
            self.directories.retain(|key| !key.starts_with(&prefix));
        }

        removed
    }

    /// All cached file paths, sorted.
    pub fn list_all_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.files.iter().map(|entry| entry.key().clone()).collect();
        files.sort();
        files
    }

    /// All known directory paths, sorted.
    pub fn list_all_directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self.directories.iter().map(|entry| entry.key().clone()).collect();
        dirs.sort();
        dirs
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&self) {
        self.files.clear();
        self.directories.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandsync_core::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_read_or_fetch_caches_hits_only() {
        let cache = FileCache::new();
        let calls = AtomicUsize::new(0);

        let file = cache
            .read_or_fetch("./app/page.tsx", |path| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(SandboxFile::text(path, "x")) }
            })
            .await;
        assert_eq!(file.unwrap().path, "app/page.tsx");

        let again = cache
            .read_or_fetch("app/page.tsx", |_| async { Err(SyncError::remote("unreachable")) })
            .await;
        assert!(again.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let missing = cache
            .read_or_fetch("missing.ts", |_| async { Err(SyncError::remote("gone")) })
            .await;
        assert!(missing.is_none());
        assert!(cache.read_cache("missing.ts").is_none());
    }

    #[tokio::test]
    async fn test_write_requires_remote_success() {
        let cache = FileCache::new();

        let ok = cache
            .write("a.ts", FileContent::Text("one".into()), |_| async { Ok(()) })
            .await;
        assert!(ok);

        let failed = cache
            .write("a.ts", FileContent::Text("two".into()), |_| async {
                Err(SyncError::remote("boom"))
            })
            .await;
        assert!(!failed);
        assert_eq!(cache.read_cache("a.ts").unwrap().content.as_text(), Some("one"));
    }

    #[test]
    fn test_placeholder_and_directories() {
        let cache = FileCache::new();
        cache.write_empty_file("public/logo.png", FileKind::Binary);
        cache.update_directory_cache("./public");
        cache.update_directory_cache("");

        assert!(cache.read_cache("public/logo.png").unwrap().content.is_empty());
        assert_eq!(cache.list_all_directories(), vec!["public".to_string()]);
        assert_eq!(cache.list_all_files(), vec!["public/logo.png".to_string()]);
        assert!(cache.contains_directory("public"));
    }

    #[test]
    fn test_delete_directory_removes_descendants() {
        let cache = FileCache::new();
        cache.update_directory_cache("app");
        cache.update_directory_cache("app/blog");
        cache.update_cache(SandboxFile::text("app/page.tsx", "a"));
        cache.update_cache(SandboxFile::text("app/blog/page.tsx", "b"));
        cache.update_cache(SandboxFile::text("apps.ts", "c"));

        assert!(cache.delete("app"));
        assert_eq!(cache.list_all_files(), vec!["apps.ts".to_string()]);
        assert!(cache.list_all_directories().is_empty());
        assert!(!cache.delete("app"));
    }

    #[test]
    fn test_clear() {
        let cache = FileCache::new();
        cache.update_cache(SandboxFile::text("a.ts", "a"));
        cache.update_directory_cache("lib");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.list_all_directories().is_empty());
    }
}
