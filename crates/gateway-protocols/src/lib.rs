//! # Gateway Protocols
//!
//! The protocol switch of the LLM pipeline gateway:
//! - Caller protocol detection and request id correlation
//! - One [`ProtocolAdapter`] per wire protocol (OpenAI Chat, OpenAI Responses,
//!   Anthropic Messages, Gemini)
//! - Byte-safe SSE buffering and normalization into canonical stream events
//! - Caller-side SSE encoders

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod anthropic;
pub mod correlation;
pub mod detection;
pub mod gemini;
pub mod internal;
pub mod openai_chat;
pub mod openai_responses;
pub mod sse;
pub mod stream;
pub mod switch;

pub use adapter::{
    adapter_for, detect_response_protocol, DecodeStatus, EncoderContext, ProtocolAdapter,
    StreamDecoder, StreamEncoder, TranslationNotes,
};
pub use correlation::{CorrelationGuard, CorrelationMap};
pub use detection::{Detection, ProtocolDetector};
pub use gemini::unwrap_cloud_code;
pub use internal::{strip_internal_keys, InternalHints};
pub use sse::{SseBuffer, SseFrame, SseLine};
pub use stream::{encode_stream, normalize_stream, PayloadHook, SseNormalizer};
pub use switch::{caller_protocol, Incoming, LlmSwitch, Outgoing, RenderedError};
