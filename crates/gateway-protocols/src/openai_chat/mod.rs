//! OpenAI Chat Completions (`/v1/chat/completions`).
//!
//! This is also the canonical shape, so translation here is mostly alias
//! normalization.

mod request;
mod response;
mod stream;

pub(crate) use response::render_error;
pub use stream::{ChatChunkDecoder, ChatChunkEncoder};

use crate::adapter::{EncoderContext, ProtocolAdapter, StreamDecoder, StreamEncoder, TranslationNotes};
use gateway_core::{CanonicalResponse, ChatRequest, GatewayResult, Protocol};
use serde_json::Value;

/// Adapter for the OpenAI Chat Completions protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatAdapter;

impl ProtocolAdapter for OpenAiChatAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::OpenAiChat
    }

    fn parse_request(&self, body: &Value, notes: &mut TranslationNotes) -> GatewayResult<ChatRequest> {
        request::parse(body, notes)
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        model: &str,
        origin: Protocol,
        notes: &mut TranslationNotes,
    ) -> GatewayResult<Value> {
        request::build(request, model, origin, notes)
    }

    fn parse_response(&self, body: &Value) -> GatewayResult<CanonicalResponse> {
        response::parse(body)
    }

    fn render_response(&self, response: &CanonicalResponse) -> Value {
        response::render(response)
    }

    fn stream_decoder(&self) -> Box<dyn StreamDecoder> {
        Box::<ChatChunkDecoder>::default()
    }

    fn stream_encoder(&self, context: EncoderContext) -> Box<dyn StreamEncoder> {
        Box::new(ChatChunkEncoder::new(context))
    }

    fn render_error(&self, status: u16, error_type: &str, message: &str) -> Value {
        response::render_error(status, error_type, message)
    }

    fn matches_response(&self, body: &Value) -> bool {
        response::matches(body)
    }
}
