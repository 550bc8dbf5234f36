//! Shared handler state.

use crate::shutdown::ShutdownCoordinator;
use gateway_config::ConfigHandle;
use gateway_pipeline::PipelineManager;
use std::sync::Arc;
use std::time::Instant;

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Pool failover manager
    pub manager: PipelineManager,
    /// Current configuration
    pub config: ConfigHandle,
    /// Shutdown coordination
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Process start
    pub started_at: Instant,
}

impl AppState {
    /// Create state for a manager and its configuration
    #[must_use]
    pub fn new(manager: PipelineManager, config: ConfigHandle) -> Self {
        let grace = config.load().server.shutdown_grace;
        Self {
            manager,
            config,
            shutdown: Arc::new(ShutdownCoordinator::new(grace)),
            started_at: Instant::now(),
        }
    }
}
