//! # Gateway Pipeline
//!
//! Pipelines and pool failover for the LLM pipeline gateway:
//! - The fixed four-stage [`Pipeline`] bound to one `(provider, model, key)`
//! - Streaming control between caller and upstream transports
//! - The compatibility field mapper
//! - Routing category resolution
//! - The [`PoolRegistry`] and the failover [`PipelineManager`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod category;
pub mod compatibility;
pub mod manager;
pub mod pipeline;
pub mod registry;
pub mod streaming;

pub use category::{infer_category, resolve_category, CategorySource};
pub use compatibility::CompatibilityMapper;
pub use manager::PipelineManager;
pub use pipeline::{AttemptOutcome, Pipeline, PipelineOutput};
pub use registry::{Pool, PoolRegistry, PoolSet};
pub use streaming::{aggregate, is_streaming_request, prime, synthesize, StreamMode, StreamPlan};
