//! Orchestration of the sandbox mirror.
//!
//! [`SyncOrchestrator`] ties together the remote session, the file cache, the
//! identifier mapper and the event bus. It moves through three states:
//! uninitialized, indexing and indexed. Indexing enumerates the remote tree,
//! fills the cache, instruments source files and starts consuming the remote
//! change stream. Afterwards reads are served from the cache and writes go
//! through to the remote before the cache is updated.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sandsync_core::SyncConfig;
//! use sandsync_vfs::{FixedRouterDetector, NoopPreloadHook, RemoteFileSystem, SyncOrchestrator};
//!
//! # async fn example(remote: Arc<dyn RemoteFileSystem>) -> sandsync_core::Result<()> {
//! let orchestrator = SyncOrchestrator::new(
//!     SyncConfig::default(),
//!     Arc::new(FixedRouterDetector::default()),
//!     Arc::new(NoopPreloadHook),
//! )?;
//! orchestrator.connect_and_index(remote).await?;
//! let page = orchestrator.read_file("app/page.tsx").await;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use sandsync_core::paths::{
    has_extension, is_binary_path, is_instrumented_path, is_root_layout_file, is_under_excluded,
    join_path, normalize_path,
};
use sandsync_core::{
    ChangeEvent, ChangeType, ChildInstance, FileContent, FileKind, Result, RouterConfig, RouterType,
    SandboxFile, SyncConfig, SyncError, TemplateNode,
};
use sandsync_mapper::{MappingResult, TemplateNodeMapper};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, instrument, warn};

use crate::event_bus::EventBus;
use crate::file_cache::FileCache;
use crate::remote::{PreloadScriptHook, RemoteFileSystem, RemoteWatchEvent, RouterDetector};
use crate::types::{DirEntryInfo, DirEntryType, IndexOutcome, IndexReport};
use crate::watch::WatchTask;

/// Remote path used to list the sandbox root.
const REMOTE_ROOT: &str = ".";

/// Depth limit for [`SyncOrchestrator::list_files_recursively`].
const MAX_LISTING_DEPTH: usize = 64;

const STAT_WATCH_EVENTS: &str = "watch_events";
const STAT_MAPPING_RUNS: &str = "mapping_runs";
const STAT_WRITE_BACKS: &str = "write_backs";
const STAT_ECHOES_SUPPRESSED: &str = "echoes_suppressed";
const STAT_ERRORS: &str = "errors";

struct Inner {
    config: SyncConfig,
    cache: FileCache,
    mapper: TemplateNodeMapper,
    bus: EventBus,
    session: RwLock<Option<Arc<dyn RemoteFileSystem>>>,
    router_detector: Arc<dyn RouterDetector>,
    preload_hook: Arc<dyn PreloadScriptHook>,
    router_config: RwLock<Option<RouterConfig>>,
    router_resolved: AtomicBool,
    router_config_tx: watch::Sender<Option<RouterConfig>>,
    is_indexed: AtomicBool,
    is_indexing: AtomicBool,
    watch_task: AsyncMutex<Option<WatchTask>>,
    stats: DashMap<String, u64>,
}

/// Clears the indexing flag on every exit path of `index`.
struct IndexingGuard<'a>(&'a AtomicBool);

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Mirrors one remote sandbox into a local cache and keeps it instrumented.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with no session attached.
    pub fn new(
        config: SyncConfig,
        router_detector: Arc<dyn RouterDetector>,
        preload_hook: Arc<dyn PreloadScriptHook>,
    ) -> Result<Self> {
        config.validate()?;

        let mapper = TemplateNodeMapper::from_config(&config)?;
        let bus = EventBus::new(config.sync().event_bus_capacity);
        let (router_config_tx, _) = watch::channel(None);

        let stats = DashMap::new();
        for key in [
            STAT_WATCH_EVENTS,
            STAT_MAPPING_RUNS,
            STAT_WRITE_BACKS,
            STAT_ECHOES_SUPPRESSED,
            STAT_ERRORS,
        ] {
            stats.insert(key.to_string(), 0);
        }

        info!("SyncOrchestrator initialized (profile: {})", config.profile());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                cache: FileCache::new(),
                mapper,
                bus,
                session: RwLock::new(None),
                router_detector,
                preload_hook,
                router_config: RwLock::new(None),
                router_resolved: AtomicBool::new(false),
                router_config_tx,
                is_indexed: AtomicBool::new(false),
                is_indexing: AtomicBool::new(false),
                watch_task: AsyncMutex::new(None),
                stats,
            }),
        })
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn mapper(&self) -> &TemplateNodeMapper {
        &self.inner.mapper
    }

    pub fn cache(&self) -> &FileCache {
        &self.inner.cache
    }

    // ============================================================================
    // Session
    // ============================================================================

    /// Attach a remote session, replacing any previous one.
    ///
    /// The new session starts unindexed and its routing convention is
    /// resolved again on the next `index` call.
    pub async fn connect(&self, remote: Arc<dyn RemoteFileSystem>) {
        self.stop_watching().await;

        *self.inner.session.write() = Some(remote);
        self.inner.is_indexed.store(false, Ordering::SeqCst);
        self.reset_router_config();

        info!("Sandbox session changed");
    }

    /// Attach a session and index it.
    pub async fn connect_and_index(&self, remote: Arc<dyn RemoteFileSystem>) -> Result<IndexOutcome> {
        self.connect(remote).await;
        self.index(false).await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.read().is_some()
    }

    fn session(&self) -> Option<Arc<dyn RemoteFileSystem>> {
        self.inner.session.read().clone()
    }

    pub fn is_indexed(&self) -> bool {
        self.inner.is_indexed.load(Ordering::SeqCst)
    }

    pub fn is_indexing(&self) -> bool {
        self.inner.is_indexing.load(Ordering::SeqCst)
    }

    // ============================================================================
    // Router Configuration
    // ============================================================================

    pub fn router_config(&self) -> Option<RouterConfig> {
        self.inner.router_config.read().clone()
    }

    /// Receiver notified whenever the routing convention is resolved or reset.
    pub fn router_config_changes(&self) -> watch::Receiver<Option<RouterConfig>> {
        self.inner.router_config_tx.subscribe()
    }

    fn router_type(&self) -> Option<RouterType> {
        self.inner
            .router_config
            .read()
            .as_ref()
            .map(|config| config.router_type)
    }

    fn reset_router_config(&self) {
        *self.inner.router_config.write() = None;
        self.inner.router_resolved.store(false, Ordering::SeqCst);
        self.inner.router_config_tx.send_replace(None);
    }

    async fn resolve_router_config(&self, remote: &dyn RemoteFileSystem) -> Result<()> {
        if self.inner.router_resolved.load(Ordering::SeqCst) {
            return Ok(());
        }

        let detected = self.inner.router_detector.detect(remote).await?;
        match &detected {
            Some(config) => info!(
                "Detected {} router at '{}'",
                config.router_type, config.base_path
            ),
            None => warn!("Could not detect a router convention"),
        }

        *self.inner.router_config.write() = detected.clone();
        self.inner.router_resolved.store(true, Ordering::SeqCst);
        self.inner.router_config_tx.send_replace(detected);
        Ok(())
    }

    // ============================================================================
    // Indexing
    // ============================================================================

    /// Enumerate, cache and instrument the whole sandbox, then start watching.
    ///
    /// Per-file failures are collected in the report. Failing to detect the
    /// router or to list the root aborts the run and leaves the orchestrator
    /// unindexed.
    #[instrument(skip(self))]
    pub async fn index(&self, force: bool) -> Result<IndexOutcome> {
        if self
            .inner
            .is_indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Indexing already in progress");
            return Ok(IndexOutcome::AlreadyIndexing);
        }
        let _guard = IndexingGuard(&self.inner.is_indexing);

        if self.is_indexed() && !force {
            debug!("Sandbox already indexed");
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let Some(remote) = self.session() else {
            warn!("Cannot index without a sandbox session");
            return Ok(IndexOutcome::NotConnected);
        };

        let start = Instant::now();
        info!("Indexing sandbox");

        self.resolve_router_config(remote.as_ref()).await?;

        let mut report = IndexReport::default();
        let files = self.discover_files(remote.as_ref(), &mut report).await?;
        report.files_discovered = files.len();

        for path in &files {
            self.index_file(remote.as_ref(), path, &mut report).await;
        }

        if let Err(e) = self.start_watching().await {
            error!("Failed to start watching remote changes: {}", e);
        }

        self.inner.is_indexed.store(true, Ordering::SeqCst);
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexing completed in {}ms: {} files, {} directories, {} rewritten, {} errors",
            report.duration_ms,
            report.files_discovered,
            report.directories_discovered,
            report.files_rewritten,
            report.errors.len()
        );

        Ok(IndexOutcome::Completed(report))
    }

    /// Breadth-first enumeration of every non-excluded file.
    ///
    /// The remote cannot tell files from directories, so an entry that can be
    /// listed is a directory. The probe's listing is reused when the directory
    /// is dequeued.
    async fn discover_files(
        &self,
        remote: &dyn RemoteFileSystem,
        report: &mut IndexReport,
    ) -> Result<Vec<String>> {
        let excluded = &self.inner.config.sync().excluded_directories;

        let root_entries = remote.list(REMOTE_ROOT).await.map_err(|e| {
            SyncError::remote(format!("Failed to list sandbox root: {}", e))
        })?;

        let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();
        queue.push_back((String::new(), root_entries));
        let mut files = Vec::new();

        while let Some((dir, entries)) = queue.pop_front() {
            for name in entries {
                let path = join_path(&dir, &name);
                if path.is_empty() || path == dir {
                    continue;
                }
                if is_under_excluded(&path, excluded) {
                    debug!("Skipping excluded path {}", path);
                    continue;
                }

                match remote.list(&path).await {
                    Ok(children) => {
                        self.inner.cache.update_directory_cache(&path);
                        report.directories_discovered += 1;
                        queue.push_back((path, children));
                    }
                    Err(_) => files.push(path),
                }
            }
        }

        Ok(files)
    }

    async fn index_file(&self, remote: &dyn RemoteFileSystem, path: &str, report: &mut IndexReport) {
        if self.is_binary(path) {
            self.inner.cache.write_empty_file(path, FileKind::Binary);
            report.binary_placeholders += 1;
            return;
        }

        let content = match remote.read(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {} during indexing: {}", path, e);
                self.bump(STAT_ERRORS);
                report.errors.push(format!("{}: {}", path, e));
                return;
            }
        };

        self.inner
            .cache
            .update_cache(SandboxFile::text(path, content.clone()));
        report.files_cached += 1;

        match self.run_mapping_pipeline(path, &content).await {
            Ok(true) => report.files_rewritten += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("Mapping pipeline failed for {}: {}", path, e);
                report.errors.push(format!("{}: {}", path, e));
            }
        }
    }

    // ============================================================================
    // Mapping Pipeline
    // ============================================================================

    fn is_binary(&self, path: &str) -> bool {
        is_binary_path(path, &self.inner.config.sync().binary_extensions)
    }

    fn is_instrumented(&self, path: &str) -> bool {
        is_instrumented_path(path, &self.inner.config.sync().instrumented_extensions)
    }

    /// Run the mapper over `content`.
    ///
    /// Returns `None` when the file could not be mapped. The mapped nodes are
    /// not recorded; callers commit them once the content they describe is
    /// persisted.
    async fn instrument(&self, path: &str, content: &str) -> Option<MappingResult> {
        let router_type = self.router_type();
        let extensions = &self.inner.config.sync().instrumented_extensions;

        if is_root_layout_file(path, router_type, extensions) {
            if let Err(e) = self.inner.preload_hook.ensure_preload_script().await {
                warn!("Failed to ensure preload script for layout {}: {}", path, e);
            }
        }

        self.bump(STAT_MAPPING_RUNS);
        let result = self.inner.mapper.map_file(path, content, router_type);

        if let Some(e) = &result.error {
            debug!("Leaving {} unmapped: {}", path, e);
            self.bump(STAT_ERRORS);
            return None;
        }
        Some(result)
    }

    /// Instrument a text file and persist the rewritten content if it changed.
    ///
    /// Returns whether a rewrite was persisted. Identifiers are recorded only
    /// for content that is actually stored.
    async fn run_mapping_pipeline(&self, path: &str, content: &str) -> Result<bool> {
        if !self.is_instrumented(path) {
            return Ok(false);
        }

        let Some(MappingResult {
            modified,
            new_content,
            nodes,
            ..
        }) = self.instrument(path, content).await
        else {
            return Ok(false);
        };

        if !modified {
            self.inner.mapper.commit_nodes(path, nodes);
            return Ok(false);
        }

        if self.persist(path, FileContent::Text(new_content)).await {
            self.inner.mapper.commit_nodes(path, nodes);
            self.bump(STAT_WRITE_BACKS);
            debug!("Persisted instrumented {}", path);
            Ok(true)
        } else {
            self.bump(STAT_ERRORS);
            Err(SyncError::remote(format!(
                "Failed to persist instrumented content of {}",
                path
            )))
        }
    }

    /// Write through to the remote, then update the cache.
    async fn persist(&self, path: &str, content: FileContent) -> bool {
        let Some(remote) = self.session() else {
            warn!("Cannot write {} without a sandbox session", path);
            return false;
        };

        self.inner
            .cache
            .write(path, content, move |file| async move {
                remote.write(&file.path, &file.content).await
            })
            .await
    }

    // ============================================================================
    // File Operations
    // ============================================================================

    /// Read a file, from the cache when possible.
    ///
    /// Binary paths yield a placeholder instead of transferring bytes; use
    /// [`read_binary_file`](Self::read_binary_file) to materialize them.
    pub async fn read_file(&self, path: &str) -> Option<SandboxFile> {
        let remote = self.session();
        let binary = self.is_binary(path);

        self.inner
            .cache
            .read_or_fetch(path, |path| async move {
                let remote = remote.ok_or(SyncError::NotConnected)?;
                if binary {
                    return Ok(SandboxFile::placeholder(path, FileKind::Binary));
                }
                let content = remote.read(&path).await?;
                Ok(SandboxFile::text(path, content))
            })
            .await
    }

    /// Read several files; paths that cannot be read are left out.
    pub async fn read_files(&self, paths: &[String]) -> HashMap<String, SandboxFile> {
        let mut results = HashMap::with_capacity(paths.len());
        for path in paths {
            match self.read_file(path).await {
                Some(file) => {
                    results.insert(path.clone(), file);
                }
                None => warn!("Failed to read file {}", path),
            }
        }
        results
    }

    /// Transfer a binary file's bytes and cache them.
    pub async fn read_binary_file(&self, path: &str) -> Option<SandboxFile> {
        let path = normalize_path(path);
        let remote = self.session()?;

        match remote.read_bytes(&path).await {
            Ok(bytes) => {
                let file = SandboxFile::binary(path, bytes);
                self.inner.cache.update_cache(file.clone());
                Some(file)
            }
            Err(e) => {
                warn!("Failed to read binary file {}: {}", path, e);
                None
            }
        }
    }

    /// Write a text file, instrumenting it first when it is a source file.
    pub async fn write_file(&self, path: &str, content: impl Into<String>) -> bool {
        let path = normalize_path(path);
        let content = content.into();

        if !self.is_connected() {
            warn!("Cannot write {} without a sandbox session", path);
            return false;
        }

        let mapped = if self.is_instrumented(&path) {
            self.instrument(&path, &content).await
        } else {
            None
        };
        let (content, nodes) = match mapped {
            Some(result) => (result.new_content, Some(result.nodes)),
            None => (content, None),
        };

        let written = self.persist(&path, FileContent::Text(content)).await;
        if written {
            if let Some(nodes) = nodes {
                self.inner.mapper.commit_nodes(&path, nodes);
            }
        }
        written
    }

    pub async fn write_binary_file(&self, path: &str, content: Vec<u8>) -> bool {
        let path = normalize_path(path);
        self.persist(&path, FileContent::Binary(content)).await
    }

    /// Whether the remote can read `path`.
    pub async fn file_exists(&self, path: &str) -> bool {
        let Some(remote) = self.session() else {
            debug!("No session for existence check of {}", path);
            return false;
        };
        remote.read(&normalize_path(path)).await.is_ok()
    }

    /// Copy a file on the remote by reading it and writing the copy.
    pub async fn copy(&self, source: &str, target: &str) -> bool {
        let Some(remote) = self.session() else {
            warn!("Cannot copy without a sandbox session");
            return false;
        };

        match transfer(remote.as_ref(), &normalize_path(source), &normalize_path(target)).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error copying {} to {}: {}", source, target, e);
                false
            }
        }
    }

    /// Rename a file on the remote.
    ///
    /// The remote has no delete, so the source is left in place.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> bool {
        let Some(remote) = self.session() else {
            warn!("Cannot rename without a sandbox session");
            return false;
        };

        let old_path = normalize_path(old_path);
        let new_path = normalize_path(new_path);
        match transfer(remote.as_ref(), &old_path, &new_path).await {
            Ok(()) => {
                warn!(
                    "Renamed {} to {}, but the original could not be removed",
                    old_path, new_path
                );
                true
            }
            Err(e) => {
                error!("Error renaming {} to {}: {}", old_path, new_path, e);
                false
            }
        }
    }

    /// Forget a path locally and announce its removal.
    ///
    /// The remote copy is not touched.
    pub async fn delete(&self, path: &str) -> bool {
        if !self.is_connected() {
            warn!("Cannot delete {} without a sandbox session", path);
            return false;
        }

        let path = normalize_path(path);
        self.inner.cache.delete(&path);
        self.inner
            .bus
            .publish(ChangeEvent::now(ChangeType::Remove, path.clone()));

        info!("Deleted {} from the local mirror", path);
        true
    }

    /// Entries directly under `dir`, all reported as files.
    pub async fn read_dir(&self, dir: &str) -> Vec<DirEntryInfo> {
        let Some(remote) = self.session() else {
            return Vec::new();
        };

        match remote.list(&remote_dir(dir)).await {
            Ok(names) => names
                .into_iter()
                .map(|name| DirEntryInfo {
                    name,
                    entry_type: DirEntryType::File,
                    is_symlink: false,
                })
                .collect(),
            Err(e) => {
                error!("Error reading directory {}: {}", dir, e);
                Vec::new()
            }
        }
    }

    /// Files under `dir`, skipping `ignore_dirs` by name.
    ///
    /// When `extensions` is non-empty only files with one of those extensions
    /// are returned.
    pub async fn list_files_recursively(
        &self,
        dir: &str,
        ignore_dirs: &[String],
        extensions: &[String],
    ) -> Vec<String> {
        let Some(remote) = self.session() else {
            return Vec::new();
        };

        let root = normalize_path(dir);
        let entries = match remote.list(&remote_dir(&root)).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error listing {}: {}", root, e);
                return Vec::new();
            }
        };

        // Depth-first: a directory's files are listed where the directory appears
        let mut results = Vec::new();
        let mut stack = vec![ListingFrame::new(root, 0, entries)];

        while let Some(frame) = stack.last_mut() {
            let Some(name) = frame.entries.next() else {
                stack.pop();
                continue;
            };
            let path = join_path(&frame.dir, &name);
            let depth = frame.depth + 1;

            match remote.list(&path).await {
                Ok(children) => {
                    if ignore_dirs.iter().any(|ignored| *ignored == name) {
                        continue;
                    }
                    if depth >= MAX_LISTING_DEPTH {
                        warn!("Not descending into {}: depth limit reached", path);
                        continue;
                    }
                    stack.push(ListingFrame::new(path, depth, children));
                }
                Err(_) => {
                    if extensions.is_empty() || has_extension(&path, extensions) {
                        results.push(path);
                    }
                }
            }
        }

        results
    }

    pub fn list_all_files(&self) -> Vec<String> {
        self.inner.cache.list_all_files()
    }

    pub fn list_all_directories(&self) -> Vec<String> {
        self.inner.cache.list_all_directories()
    }

    // ============================================================================
    // Identifier Lookups
    // ============================================================================

    pub fn get_template_node(&self, oid: &str) -> Option<TemplateNode> {
        self.inner.mapper.get_template_node(oid)
    }

    /// Source text of the element identified by `oid`.
    pub async fn get_code_block(&self, oid: &str) -> Option<String> {
        let Some(node) = self.inner.mapper.get_template_node(oid) else {
            warn!("No template node found for oid {}", oid);
            return None;
        };

        let Some(file) = self.read_file(&node.path).await else {
            warn!("No file found for template node {}", oid);
            return None;
        };

        let Some(content) = file.content.as_text() else {
            warn!("File {} of template node {} is binary", node.path, oid);
            return None;
        };

        self.inner.mapper.get_code_block(&node, content)
    }

    /// Resolve an instance of `child` inside the element identified by `parent_oid`.
    pub async fn get_template_node_child(
        &self,
        parent_oid: &str,
        child: &TemplateNode,
        index: Option<usize>,
    ) -> Option<ChildInstance> {
        let Some(code_block) = self.get_code_block(parent_oid).await else {
            warn!("Failed to read code block {}", parent_oid);
            return None;
        };
        self.inner
            .mapper
            .get_template_node_child(&code_block, child, index)
    }

    /// Path of the root layout for the detected routing convention.
    pub async fn get_root_layout_path(&self) -> Option<String> {
        let Some(router_config) = self.router_config() else {
            debug!("No router convention detected, root layout unknown");
            return None;
        };

        let name = router_config.router_type.layout_file_name();
        for ext in &self.inner.config.sync().instrumented_extensions {
            let file_name = format!("{}.{}", name, ext.trim_start_matches('.'));
            let candidate = join_path(&router_config.base_path, &file_name);
            if self.file_exists(&candidate).await {
                return Some(candidate);
            }
        }

        debug!("No root layout found under '{}'", router_config.base_path);
        None
    }

    // ============================================================================
    // Remote Change Stream
    // ============================================================================

    /// Start consuming the remote change stream.
    ///
    /// Returns `Ok(false)` if already watching or not connected.
    pub async fn start_watching(&self) -> Result<bool> {
        let mut slot = self.inner.watch_task.lock().await;
        if slot.as_ref().map(|task| !task.is_finished()).unwrap_or(false) {
            return Ok(false);
        }

        let Some(remote) = self.session() else {
            return Ok(false);
        };

        let stream = remote.watch().await?;
        let weak = self.downgrade();
        let task = WatchTask::spawn(
            stream,
            self.inner.config.sync().watch_channel_capacity,
            move |event| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            SyncOrchestrator::from_inner(inner)
                                .handle_watch_event(event)
                                .await;
                            true
                        }
                        None => false,
                    }
                }
            },
        );

        *slot = Some(task);
        info!("Watching remote changes");
        Ok(true)
    }

    /// Stop consuming the remote change stream and wait for it to wind down.
    pub async fn stop_watching(&self) {
        let task = self.inner.watch_task.lock().await.take();
        if let Some(task) = task {
            task.shutdown().await;
            info!("Stopped watching remote changes");
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.inner
            .watch_task
            .lock()
            .await
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// React to one remote change and announce it.
    async fn handle_watch_event(&self, event: RemoteWatchEvent) {
        self.bump(STAT_WATCH_EVENTS);

        let path = normalize_path(&event.filename);
        if path.is_empty() || is_under_excluded(&path, &self.inner.config.sync().excluded_directories) {
            return;
        }

        debug!("Remote {:?} for {}", event.event_type, path);
        if let Err(e) = self.handle_file_changed(&path).await {
            self.bump(STAT_ERRORS);
            error!("Failed to sync remote change of {}: {}", path, e);
        }

        self.inner
            .bus
            .publish(ChangeEvent::now(ChangeType::Change, path.clone()));

        let preload_src = self
            .inner
            .config
            .sync()
            .preload_script_src
            .trim_start_matches('/');
        if self.inner.config.profile().is_dev() && !preload_src.is_empty() && path.contains(preload_src) {
            if let Err(e) = self.inner.preload_hook.ensure_preload_script().await {
                warn!("Failed to ensure preload script after change to {}: {}", path, e);
            }
        }
    }

    async fn handle_file_changed(&self, path: &str) -> Result<()> {
        let remote = self.session().ok_or(SyncError::NotConnected)?;
        let cached = self.inner.cache.read_cache(path);

        if self.is_binary(path) {
            match cached {
                Some(file) if !file.content.is_empty() => {
                    let bytes = remote.read_bytes(path).await?;
                    self.inner.cache.update_cache(SandboxFile::binary(path, bytes));
                }
                _ => self.inner.cache.write_empty_file(path, FileKind::Binary),
            }
            return Ok(());
        }

        let content = remote.read(path).await?;
        let changed = cached
            .as_ref()
            .and_then(|file| file.content.as_text())
            .map(|previous| previous != content)
            .unwrap_or(true);

        self.inner
            .cache
            .update_cache(SandboxFile::text(path, content.clone()));

        if changed {
            self.run_mapping_pipeline(path, &content).await?;
        } else {
            self.bump(STAT_ECHOES_SUPPRESSED);
            debug!("Content of {} unchanged, skipping mapping", path);
        }

        Ok(())
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Drop all state and release the session.
    ///
    /// Event bus subscribers stay registered.
    pub async fn clear(&self) {
        self.stop_watching().await;

        self.inner.cache.clear();
        self.inner.mapper.clear();
        self.inner.is_indexed.store(false, Ordering::SeqCst);
        self.inner.is_indexing.store(false, Ordering::SeqCst);
        self.reset_router_config();

        let session = self.inner.session.write().take();
        if let Some(remote) = session {
            if let Err(e) = remote.shutdown().await {
                warn!("Error shutting down sandbox session: {}", e);
            }
        }

        info!("Sandbox mirror cleared");
    }

    /// Current counters.
    pub fn stats(&self) -> HashMap<String, u64> {
        self.inner
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn bump(&self, key: &str) {
        if let Some(mut count) = self.inner.stats.get_mut(key) {
            *count += 1;
        }
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("connected", &self.is_connected())
            .field("indexed", &self.is_indexed())
            .field("indexing", &self.is_indexing())
            .field("files", &self.inner.cache.len())
            .finish()
    }
}

/// Read `source` and write its content to `target`.
async fn transfer(remote: &dyn RemoteFileSystem, source: &str, target: &str) -> Result<()> {
    let content = remote.read(source).await?;
    remote.write(target, &FileContent::Text(content)).await
}

/// A directory being walked by [`SyncOrchestrator::list_files_recursively`].
struct ListingFrame {
    dir: String,
    depth: usize,
    entries: std::vec::IntoIter<String>,
}

impl ListingFrame {
    fn new(dir: String, depth: usize, entries: Vec<String>) -> Self {
        Self {
            dir,
            depth,
            entries: entries.into_iter(),
        }
    }
}

fn remote_dir(dir: &str) -> String {
    let dir = normalize_path(dir);
    if dir.is_empty() {
        REMOTE_ROOT.to_string()
    } else {
        dir
    }
}
