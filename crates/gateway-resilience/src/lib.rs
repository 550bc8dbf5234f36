//! # Gateway Resilience
//!
//! Resilience primitives for pool failover in the LLM pipeline gateway:
//! - Exponential backoff with jitter between pool attempts
//! - Per-attempt timeouts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod retry;
pub mod timeout;

// Re-export main types
pub use retry::Backoff;
pub use timeout::AttemptTimeout;
