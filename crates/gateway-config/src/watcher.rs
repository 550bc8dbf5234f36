//! Atomically swappable configuration and hot reload.

use crate::config::GatewayConfig;
use crate::loader::load_from_path;
use arc_swap::ArcSwap;
use gateway_core::{GatewayError, GatewayResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared, versioned view of the current configuration.
///
/// Readers never block; a reload replaces the whole config.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<GatewayConfig>>,
    version: watch::Sender<u64>,
}

impl ConfigHandle {
    /// Wrap an already validated configuration
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
            version,
        }
    }

    /// Current configuration snapshot
    #[must_use]
    pub fn load(&self) -> Arc<GatewayConfig> {
        self.inner.load_full()
    }

    /// Current version, incremented by every successful replace
    #[must_use]
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Validate and swap in a new configuration
    ///
    /// # Errors
    /// Returns a configuration error and keeps the old config if validation fails
    pub fn replace(&self, config: GatewayConfig) -> GatewayResult<u64> {
        config.validate()?;
        self.inner.store(Arc::new(config));
        let mut next = 0;
        self.version.send_modify(|v| {
            *v += 1;
            next = *v;
        });
        Ok(next)
    }

    /// Receive a notification after each successful replace
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Reloads the config file into a [`ConfigHandle`] when it changes
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Watch `path` and reload it on modification
    ///
    /// # Errors
    /// Returns a configuration error if the file cannot be watched
    pub fn spawn(path: &Path, handle: ConfigHandle) -> GatewayResult<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "Config watch error"),
            }
        })
        .map_err(|e| GatewayError::configuration(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                GatewayError::configuration(format!("failed to watch {}: {e}", path.display()))
            })?;

        let path: PathBuf = path.to_path_buf();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                // Editors emit bursts of events for one save
                while rx.try_recv().is_ok() {}
                reload(&path, &handle).await;
            }
        });

        info!("Config watcher started");
        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn reload(path: &Path, handle: &ConfigHandle) {
    match load_from_path(path).await {
        Ok(config) => match handle.replace(config) {
            Ok(version) => info!(path = %path.display(), version, "Configuration reloaded"),
            Err(e) => error!(error = %e, "Reloaded configuration rejected, keeping previous"),
        },
        Err(e) => error!(error = %e, "Configuration reload failed, keeping previous"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_bumps_version_and_notifies() {
        let handle = ConfigHandle::new(GatewayConfig::default());
        let rx = handle.subscribe();
        assert_eq!(handle.version(), 0);

        let mut next = GatewayConfig::default();
        next.server.port = 9999;
        assert_eq!(handle.replace(next).unwrap(), 1);
        assert_eq!(handle.load().server.port, 9999);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_invalid_replace_keeps_old_config() {
        let handle = ConfigHandle::new(GatewayConfig::default());
        let mut bad = GatewayConfig::default();
        bad.server.port = 0;
        assert!(handle.replace(bad).is_err());
        assert_eq!(handle.load().server.port, 5506);
        assert_eq!(handle.version(), 0);
    }

    #[tokio::test]
    async fn test_reload_of_invalid_file_keeps_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, "server: [").unwrap();

        let handle = ConfigHandle::new(GatewayConfig::default());
        reload(&path, &handle).await;
        assert_eq!(handle.version(), 0);

        std::fs::write(&path, "server:\n  port: 6000\n").unwrap();
        reload(&path, &handle).await;
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.load().server.port, 6000);
    }
}
