//! Router convention detection by probing well-known directories.

use async_trait::async_trait;
use sandsync_core::paths::root_layout_dirs;
use sandsync_core::{Result, RouterConfig, RouterType};
use sandsync_vfs::{RemoteFileSystem, RouterDetector};
use tracing::debug;

/// Picks the first listable directory among `app`, `src/app`, `pages`, `src/pages`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeRouterDetector;

#[async_trait]
impl RouterDetector for ProbeRouterDetector {
    async fn detect(&self, remote: &dyn RemoteFileSystem) -> Result<Option<RouterConfig>> {
        for router_type in [RouterType::App, RouterType::Pages] {
            for dir in root_layout_dirs(router_type) {
                if remote.list(dir).await.is_ok() {
                    debug!("Found {} router directory at {}", router_type, dir);
                    return Ok(Some(RouterConfig::new(router_type, dir)));
                }
            }
        }
        Ok(None)
    }
}
