//! Backoff between pool attempts.
//!
//! The pool itself bounds the number of attempts; this module only decides how
//! long to wait before moving to the next pool member.

use gateway_config::RetryConfig;
use gateway_core::GatewayError;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier.max(1.0),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// No delay between attempts
    #[must_use]
    pub fn none() -> Self {
        Self::new(&RetryConfig {
            base_delay: Duration::ZERO,
            ..RetryConfig::default()
        })
    }

    /// Delay before the attempt following attempt `attempt` (0-indexed)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        if base <= 0.0 {
            return Duration::ZERO;
        }
        let delay = base * self.multiplier.powi(attempt.min(32) as i32);
        let delay = delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }

    /// Delay after `error` on attempt `attempt`.
    ///
    /// A rate limit's `retry_after` is honoured up to the configured cap.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, error: &GatewayError) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        match error.root() {
            GatewayError::RateLimit {
                retry_after: Some(after),
                ..
            } if self.base_delay > Duration::ZERO => {
                let delay = computed.max(*after).min(self.max_delay);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Honouring retry-after");
                delay
            }
            _ => computed,
        }
    }

    /// Sleep before the next attempt
    pub async fn wait(&self, attempt: u32, error: &GatewayError) {
        let delay = self.delay_after(attempt, error);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
