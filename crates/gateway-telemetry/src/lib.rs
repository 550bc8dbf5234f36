//! # Gateway Telemetry
//!
//! Logging and tracing for the LLM pipeline gateway.
//!
//! This crate provides:
//! - Structured logging (pretty or JSON) with `RUST_LOG` overrides
//! - Optional OpenTelemetry span export
//! - Request span helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod tracing_setup;

// Re-export main types
pub use tracing_setup::{build_filter, init_logging, TelemetryError, TelemetryGuard};
