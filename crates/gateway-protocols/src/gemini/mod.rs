//! Google Gemini `generateContent` / `streamGenerateContent`.
//!
//! The model and the streaming flag are part of the URL, not the body.

mod parts;
mod request;
mod response;
mod stream;

pub use parts::{
    CodeExecutionResult, ExecutableCode, FileData, FunctionCallPart, FunctionResponsePart,
    GeminiPart, InlineData,
};
pub use stream::{GeminiStreamDecoder, GeminiStreamEncoder};

use crate::adapter::{EncoderContext, ProtocolAdapter, StreamDecoder, StreamEncoder, TranslationNotes};
use gateway_core::{CanonicalResponse, ChatRequest, GatewayResult, Protocol};
use serde_json::Value;

/// Strip the Cloud Code `{response: ...}` envelope from a response body
#[must_use]
pub fn unwrap_cloud_code(body: &Value) -> &Value {
    response::unwrap_envelope(body)
}

/// Adapter for the Gemini protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl ProtocolAdapter for GeminiAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Gemini
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
        Box::<GeminiStreamDecoder>::default()
    }

    fn stream_encoder(&self, context: EncoderContext) -> Box<dyn StreamEncoder> {
        Box::new(GeminiStreamEncoder::new(context))
    }

    fn render_error(&self, status: u16, error_type: &str, message: &str) -> Value {
        response::render_error(status, error_type, message)
    }

    fn matches_response(&self, body: &Value) -> bool {
        response::matches(body)
    }
}
