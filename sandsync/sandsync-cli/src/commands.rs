//! Command implementations for the `sandsync` binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sandsync_core::{ConfigProfile, SyncConfig};
use sandsync_vfs::{IndexOutcome, IndexReport, NoopPreloadHook, SyncOrchestrator};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::detector::ProbeRouterDetector;
use crate::local::LocalDirRemote;
use crate::output::{self, OutputFormat};

/// Resolve the configuration from a file or from the profile defaults.
///
/// Environment overrides apply in both cases.
pub async fn load_config(path: Option<&Path>, profile: Option<ConfigProfile>) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => SyncConfig::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let mut config = SyncConfig::with_profile(profile.unwrap_or_else(ConfigProfile::from_env));
            config.merge_env_vars()?;
            config
        }
    };

    if let Some(profile) = profile {
        config.set_profile(profile);
    }
    config.validate()?;
    Ok(config)
}

/// Orchestrator wired with the CLI's collaborators.
pub fn build_orchestrator(config: SyncConfig) -> Result<SyncOrchestrator> {
    Ok(SyncOrchestrator::new(
        config,
        Arc::new(ProbeRouterDetector),
        Arc::new(NoopPreloadHook),
    )?)
}

/// Connect to `root` and index it.
pub async fn open(root: &Path, config: SyncConfig) -> Result<(SyncOrchestrator, IndexReport)> {
    let remote = Arc::new(LocalDirRemote::new(root)?);
    let orchestrator = build_orchestrator(config)?;

    match orchestrator.connect_and_index(remote).await? {
        IndexOutcome::Completed(report) => Ok((orchestrator, report)),
        other => bail!("Indexing did not run: {:?}", other),
    }
}

/// Index a directory once, instrumenting its source files in place.
pub async fn index(root: &Path, config: SyncConfig, format: OutputFormat) -> Result<()> {
    let (orchestrator, report) = open(root, config).await?;
    output::report(&report, orchestrator.router_config().as_ref(), format)?;
    orchestrator.clear().await;
    Ok(())
}

/// Index a directory and keep it instrumented until interrupted.
pub async fn watch(root: &Path, config: SyncConfig, format: OutputFormat) -> Result<()> {
    let (orchestrator, report) = open(root, config).await?;
    output::report(&report, orchestrator.router_config().as_ref(), format)?;

    let mut events = orchestrator.event_bus().stream();
    if format == OutputFormat::Human {
        output::info(format!("Watching {} (Ctrl+C to stop)", root.display()));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => output::change(&event, format)?,
                Err(RecvError::Lagged(missed)) => warn!("Missed {} change events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    }

    debug!("Watch stats: {:?}", orchestrator.stats());
    orchestrator.clear().await;
    Ok(())
}

/// Show the element behind an identifier and its source.
pub async fn node(root: &Path, config: SyncConfig, oid: &str, format: OutputFormat) -> Result<()> {
    let (orchestrator, _) = open(root, config).await?;

    let Some(node) = orchestrator.get_template_node(oid) else {
        bail!("No element with identifier {}", oid);
    };
    let code = orchestrator.get_code_block(oid).await;

    output::node(&node, code.as_deref(), format)?;

    orchestrator.clear().await;
    Ok(())
}

/// List the identified elements of one file.
pub async fn nodes(root: &Path, config: SyncConfig, path: &str, format: OutputFormat) -> Result<()> {
    let (orchestrator, _) = open(root, config).await?;
    let nodes = orchestrator.mapper().nodes_for_path(path);

    output::node_list(path, &nodes, format)?;

    orchestrator.clear().await;
    Ok(())
}

/// List files under a directory without indexing.
pub async fn ls(
    root: &Path,
    config: SyncConfig,
    dir: &str,
    extensions: &[String],
    format: OutputFormat,
) -> Result<()> {
    let ignore = config.sync().excluded_directories.clone();
    let orchestrator = build_orchestrator(config)?;
    orchestrator.connect(Arc::new(LocalDirRemote::new(root)?)).await;

    let files = orchestrator.list_files_recursively(dir, &ignore, extensions).await;
    output::file_list(&files, format)?;

    orchestrator.clear().await;
    Ok(())
}

/// Write the configuration for `profile` to `path`.
pub async fn init_config(path: &Path, profile: ConfigProfile) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    SyncConfig::with_profile(profile).save_to_path(path).await?;
    output::success(format!("Wrote {} configuration to {}", profile, path.display()));
    Ok(())
}
