//! Per-attempt deadlines.

use gateway_core::{GatewayError, GatewayResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Deadline applied to each pool attempt independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeout {
    duration: Duration,
}

impl AttemptTimeout {
    /// Create a deadline; zero disables it
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured deadline
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `future`, failing with a transient timeout error when the deadline elapses
    pub async fn run<T, F>(&self, phase: &str, future: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        if self.duration.is_zero() {
            return future.await;
        }
        match tokio::time::timeout(self.duration, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    phase = %phase,
                    timeout_ms = self.duration.as_millis() as u64,
                    "Attempt timed out"
                );
                Err(GatewayError::timeout(self.duration, phase))
            }
        }
    }
}
