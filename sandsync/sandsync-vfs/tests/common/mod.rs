//! Shared helpers: an in-memory remote sandbox and collaborator doubles.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sandsync_core::paths::normalize_path;
use sandsync_core::{
    ChangeEvent, ChangeType, ConfigProfile, FileContent, Result, RouterConfig, RouterType,
    SyncConfig, SyncError,
};
use sandsync_vfs::{
    FixedRouterDetector, PreloadScriptHook, RemoteFileSystem, RemoteWatchEvent, RemoteWatchStream,
    RouterDetector, SyncOrchestrator,
};
use tokio::sync::{broadcast, mpsc};

/// In-memory remote store with call counters and failure switches.
#[derive(Default)]
pub struct FakeRemote {
    files: Mutex<BTreeMap<String, FileContent>>,
    text_reads: Mutex<HashMap<String, usize>>,
    byte_reads: Mutex<HashMap<String, usize>>,
    writes: Mutex<Vec<String>>,
    failing_reads: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
    fail_root_listing: AtomicBool,
    watch_tx: Mutex<Option<mpsc::UnboundedSender<Result<RemoteWatchEvent>>>>,
    watch_calls: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_files(files: &[(&str, &str)]) -> Arc<Self> {
        let remote = Self::new();
        for (path, content) in files {
            remote.put_text(path, content);
        }
        remote
    }

    /// Change the remote without going through the orchestrator.
    pub fn put_text(&self, path: &str, content: &str) {
        self.files
            .lock()
            .insert(normalize_path(path), FileContent::Text(content.to_string()));
    }

    pub fn put_bytes(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .insert(normalize_path(path), FileContent::Binary(content.to_vec()));
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .and_then(|content| content.as_text().map(str::to_string))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    pub fn text_reads(&self, path: &str) -> usize {
        self.text_reads.lock().get(path).copied().unwrap_or(0)
    }

    pub fn byte_reads(&self, path: &str) -> usize {
        self.byte_reads.lock().get(path).copied().unwrap_or(0)
    }

    pub fn writes_to(&self, path: &str) -> usize {
        self.writes.lock().iter().filter(|p| *p == path).count()
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn fail_reads_of(&self, path: &str) {
        self.failing_reads.lock().insert(path.to_string());
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_root_listing(&self, fail: bool) {
        self.fail_root_listing.store(fail, Ordering::SeqCst);
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Deliver a change notification on the active watch stream.
    pub fn emit(&self, event: RemoteWatchEvent) {
        if let Some(tx) = self.watch_tx.lock().as_ref() {
            let _ = tx.send(Ok(event));
        }
    }

    pub fn emit_error(&self, message: &str) {
        if let Some(tx) = self.watch_tx.lock().as_ref() {
            let _ = tx.send(Err(SyncError::watch(message)));
        }
    }

    /// End the active watch stream.
    pub fn end_watch(&self) {
        self.watch_tx.lock().take();
    }
}

#[async_trait]
impl RemoteFileSystem for FakeRemote {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let dir = normalize_path(path);
        if dir.is_empty() && self.fail_root_listing.load(Ordering::SeqCst) {
            return Err(SyncError::remote("root listing refused"));
        }

        let files = self.files.lock();
        if files.contains_key(&dir) {
            return Err(SyncError::remote(format!("{} is not a directory", dir)));
        }

        let prefix = if dir.is_empty() { String::new() } else { format!("{}/", dir) };
        let names: BTreeSet<String> = files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();

        if names.is_empty() && !dir.is_empty() {
            return Err(SyncError::not_found("Directory", dir));
        }
        Ok(names.into_iter().collect())
    }

    async fn read(&self, path: &str) -> Result<String> {
        let path = normalize_path(path);
        *self.text_reads.lock().entry(path.clone()).or_insert(0) += 1;

        if self.failing_reads.lock().contains(&path) {
            return Err(SyncError::remote(format!("read of {} refused", path)));
        }
        match self.files.lock().get(&path) {
            Some(FileContent::Text(text)) => Ok(text.clone()),
            Some(FileContent::Binary(bytes)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            None => Err(SyncError::not_found("File", path)),
        }
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path);
        *self.byte_reads.lock().entry(path.clone()).or_insert(0) += 1;

        match self.files.lock().get(&path) {
            Some(FileContent::Binary(bytes)) => Ok(bytes.clone()),
            Some(FileContent::Text(text)) => Ok(text.as_bytes().to_vec()),
            None => Err(SyncError::not_found("File", path)),
        }
    }

    async fn write(&self, path: &str, content: &FileContent) -> Result<()> {
        let path = normalize_path(path);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::remote(format!("write of {} refused", path)));
        }
        self.writes.lock().push(path.clone());
        self.files.lock().insert(path, content.clone());
        Ok(())
    }

    async fn watch(&self) -> Result<RemoteWatchStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.watch_tx.lock() = Some(tx);

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        let stream: RemoteWatchStream = Box::pin(stream);
        Ok(stream)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Preload hook that counts invocations.
#[derive(Default)]
pub struct CountingPreloadHook {
    calls: AtomicUsize,
}

impl CountingPreloadHook {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreloadScriptHook for CountingPreloadHook {
    async fn ensure_preload_script(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Detector that always fails.
pub struct FailingDetector;

#[async_trait]
impl RouterDetector for FailingDetector {
    async fn detect(&self, _remote: &dyn RemoteFileSystem) -> Result<Option<RouterConfig>> {
        Err(SyncError::remote("detector unavailable"))
    }
}

pub fn app_router() -> Arc<FixedRouterDetector> {
    Arc::new(FixedRouterDetector::new(Some(RouterConfig::new(
        RouterType::App,
        "app",
    ))))
}

pub fn test_config() -> SyncConfig {
    SyncConfig::with_profile(ConfigProfile::Test)
}

pub struct Harness {
    pub orchestrator: SyncOrchestrator,
    pub remote: Arc<FakeRemote>,
    pub preload: Arc<CountingPreloadHook>,
}

pub fn harness_with(
    config: SyncConfig,
    detector: Arc<dyn RouterDetector>,
    remote: Arc<FakeRemote>,
) -> Harness {
    let preload = Arc::new(CountingPreloadHook::default());
    let orchestrator = SyncOrchestrator::new(config, detector, preload.clone()).unwrap();
    Harness {
        orchestrator,
        remote,
        preload,
    }
}

pub fn harness(remote: Arc<FakeRemote>) -> Harness {
    harness_with(test_config(), app_router(), remote)
}

impl Harness {
    pub async fn connect(&self) {
        self.orchestrator.connect(self.remote.clone()).await;
    }
}

/// Next published event matching `predicate`, or panic after a timeout.
pub async fn next_event<F>(rx: &mut broadcast::Receiver<ChangeEvent>, predicate: F) -> ChangeEvent
where
    F: Fn(&ChangeEvent) -> bool,
{
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for change event")
}

pub fn is_change_of(path: &'static str) -> impl Fn(&ChangeEvent) -> bool {
    move |event| event.change_type == ChangeType::Change && event.paths == [path]
}

/// Poll `condition` until it holds, or panic after a timeout.
pub async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
