//! Anthropic Messages (`/v1/messages`).

mod request;
mod response;
mod stream;

pub use request::{normalize_tool_choice, DEFAULT_MAX_TOKENS, MIN_THINKING_BUDGET};
pub use stream::{MessagesStreamDecoder, MessagesStreamEncoder};

use crate::adapter::{EncoderContext, ProtocolAdapter, StreamDecoder, StreamEncoder, TranslationNotes};
use gateway_core::{CanonicalResponse, ChatRequest, GatewayResult, Protocol};
use serde_json::Value;

/// Adapter for the Anthropic Messages protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProtocolAdapter for AnthropicAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::AnthropicMessages
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
        Box::<MessagesStreamDecoder>::default()
    }

    fn stream_encoder(&self, context: EncoderContext) -> Box<dyn StreamEncoder> {
        Box::new(MessagesStreamEncoder::new(context))
    }

    fn render_error(&self, status: u16, error_type: &str, message: &str) -> Value {
        response::render_error(status, error_type, message)
    }

    fn matches_response(&self, body: &Value) -> bool {
        response::matches(body)
    }
}
