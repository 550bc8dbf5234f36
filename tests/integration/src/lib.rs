//! Integration tests for the LLM pipeline gateway
//!
//! Every test boots the real HTTP server on an ephemeral port in front of
//! wiremock upstreams speaking the provider protocols.

pub mod fixtures;
pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod failover_tests;
#[cfg(test)]
mod protocol_tests;
#[cfg(test)]
mod routing_tests;
#[cfg(test)]
mod streaming_tests;
