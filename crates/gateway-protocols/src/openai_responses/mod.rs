//! OpenAI Responses (`/v1/responses`).

mod request;
mod response;
mod stream;

pub use stream::{ResponsesStreamDecoder, ResponsesStreamEncoder};

use crate::adapter::{EncoderContext, ProtocolAdapter, StreamDecoder, StreamEncoder, TranslationNotes};
use gateway_core::{CanonicalResponse, ChatRequest, GatewayResult, Protocol};
use serde_json::Value;

/// Adapter for the OpenAI Responses protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponsesAdapter;

impl ProtocolAdapter for OpenAiResponsesAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::OpenAiResponses
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
        Box::<ResponsesStreamDecoder>::default()
    }

    fn stream_encoder(&self, context: EncoderContext) -> Box<dyn StreamEncoder> {
        Box::new(ResponsesStreamEncoder::new(context))
    }

    fn render_error(&self, status: u16, error_type: &str, message: &str) -> Value {
        // Same envelope as Chat Completions
        crate::openai_chat::render_error(status, error_type, message)
    }

    fn matches_response(&self, body: &Value) -> bool {
        response::matches(body)
    }
}
