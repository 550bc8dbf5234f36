//! # Gateway Core
//!
//! Core types, traits, and error handling for the LLM pipeline gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Request/response envelopes that travel through a pipeline
//! - The canonical (protocol-neutral) request, response and stream event model
//! - The closed set of wire protocols
//! - Error taxonomy and classification
//! - The credential collaborator contract

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credential;
pub mod envelope;
pub mod error;
pub mod protocol;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use credential::{Credential, CredentialProvider};
pub use envelope::{
    DebugInfo, PipelineRequest, PipelineResponse, ResponseData, ResponseMetadata, RouteInfo,
    RouteRequest, Stage, StageError, StageTiming,
};
pub use error::{ErrorClass, GatewayError, GatewayResult};
pub use protocol::Protocol;
pub use request::{
    parse_arguments, ChatMessage, ChatRequest, ContentPart, FunctionCall, FunctionDefinition,
    ImageUrl, MessageContent, MessageRole, ReasoningConfig, ToolCall, ToolChoice, ToolDefinition,
};
pub use response::{CanonicalResponse, FinishReason, OutputPart, Usage};
pub use streaming::{ByteStream, DoneInfo, EventKind, EventStream, StreamEvent, StreamFailure};
pub use types::{KeyId, ModelId, PipelineId, ProviderId, RequestId};
