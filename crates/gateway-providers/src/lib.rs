//! # Gateway Providers
//!
//! Provider transport for the LLM pipeline gateway.
//!
//! This crate sends native request bodies to configured upstreams:
//! - Endpoint resolution per upstream protocol (including the Gemini Cloud Code envelope)
//! - Header and credential finalization
//! - Typed classification of upstream failures
//! - The static credential source and the per-pipeline credential cache

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod credentials;
pub mod endpoint;
pub mod transport;

// Re-export main types
pub use classify::{classify_status, classify_transport};
pub use credentials::{CredentialCache, StaticCredentialProvider};
pub use endpoint::{unwrap_cloud_code_in_place, ANTHROPIC_VERSION};
pub use transport::{ProviderTransport, UpstreamBody, UpstreamCall};
