//! The per-protocol adapter interface.
//!
//! Each supported wire protocol has exactly one [`ProtocolAdapter`]. The set is
//! closed: [`adapter_for`] is the only dispatch point, selected once per request.

use crate::anthropic::AnthropicAdapter;
use crate::gemini::GeminiAdapter;
use crate::openai_chat::OpenAiChatAdapter;
use crate::openai_responses::OpenAiResponsesAdapter;
use crate::sse::SseFrame;
use gateway_core::{
    CanonicalResponse, ChatRequest, DoneInfo, GatewayResult, OutputPart, Protocol, StreamEvent,
};
use serde_json::{Map, Value};
use tracing::warn;

/// Fields dropped or degraded while translating one payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationNotes(Vec<String>);

impl TranslationNotes {
    /// Create an empty set of notes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field that has no counterpart in the target protocol
    pub fn dropped(&mut self, field: &str, target: Protocol) {
        warn!(field = %field, target = %target, "Dropping field with no mapping");
        self.0.push(format!("dropped '{field}': no mapping to {target}"));
    }

    /// Record any other lossy step
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(note = %message, "Lossy translation");
        self.0.push(message);
    }

    /// Recorded notes
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the notes out
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Identity of the response a stream encoder produces
#[derive(Debug, Clone)]
pub struct EncoderContext {
    /// Response id
    pub id: String,
    /// Model reported to the caller
    pub model: String,
    /// Unix creation time
    pub created: i64,
}

impl EncoderContext {
    /// Context with a generated id
    #[must_use]
    pub fn new(prefix: &str, model: impl Into<String>) -> Self {
        Self {
            id: format!("{prefix}{}", uuid::Uuid::new_v4().simple()),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
        }
    }
}

/// Result of decoding one upstream stream payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// More payloads expected
    Continue,
    /// Upstream signalled the end in-band
    Finished,
    /// Upstream reported an error in-band
    Failed(String),
}

/// Stateful decoder of one upstream protocol's stream payloads
pub trait StreamDecoder: Send {
    /// Decode one parsed `data:` payload; `event` is the preceding `event:` name
    fn decode(&mut self, event: Option<&str>, payload: Value, out: &mut Vec<OutputPart>)
        -> DecodeStatus;

    /// Flush buffered parts at end of stream and report terminal information
    fn finish(&mut self, out: &mut Vec<OutputPart>) -> DoneInfo;
}

/// Stateful encoder of canonical events into one caller protocol's SSE frames
pub trait StreamEncoder: Send {
    /// Encode one event; terminal events close the caller stream
    fn encode(&mut self, event: &StreamEvent) -> Vec<SseFrame>;
}

/// Bidirectional translation between one wire protocol and the canonical model
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol this adapter speaks
    fn protocol(&self) -> Protocol;

    /// Caller body to canonical request
    ///
    /// # Errors
    /// Returns a validation error if the body is not a request of this protocol
    fn parse_request(&self, body: &Value, notes: &mut TranslationNotes)
        -> GatewayResult<ChatRequest>;

    /// Canonical request to upstream body.
    ///
    /// `origin` is the caller's protocol; extra fields survive only when it equals
    /// this adapter's protocol.
    ///
    /// # Errors
    /// Returns a translation error if the request cannot be expressed
    fn build_request(
        &self,
        request: &ChatRequest,
        model: &str,
        origin: Protocol,
        notes: &mut TranslationNotes,
    ) -> GatewayResult<Value>;

    /// Upstream JSON response to canonical response
    ///
    /// # Errors
    /// Returns a translation error if the body is not a response of this protocol
    fn parse_response(&self, body: &Value) -> GatewayResult<CanonicalResponse>;

    /// Canonical response to caller JSON
    fn render_response(&self, response: &CanonicalResponse) -> Value;

    /// Decoder for this protocol's upstream stream
    fn stream_decoder(&self) -> Box<dyn StreamDecoder>;

    /// Encoder for this protocol's caller stream
    fn stream_encoder(&self, context: EncoderContext) -> Box<dyn StreamEncoder>;

    /// Caller error body in this protocol's shape
    fn render_error(&self, status: u16, error_type: &str, message: &str) -> Value;

    /// Whether a JSON response body has this protocol's shape
    fn matches_response(&self, body: &Value) -> bool;
}

static OPENAI_CHAT: OpenAiChatAdapter = OpenAiChatAdapter;
static OPENAI_RESPONSES: OpenAiResponsesAdapter = OpenAiResponsesAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;
static GEMINI: GeminiAdapter = GeminiAdapter;

/// The adapter for a protocol
#[must_use]
pub fn adapter_for(protocol: Protocol) -> &'static dyn ProtocolAdapter {
    match protocol {
        Protocol::OpenAiChat => &OPENAI_CHAT,
        Protocol::OpenAiResponses => &OPENAI_RESPONSES,
        Protocol::AnthropicMessages => &ANTHROPIC,
        Protocol::Gemini => &GEMINI,
    }
}

/// Re-detect the protocol of a response body from its shape
#[must_use]
pub fn detect_response_protocol(body: &Value) -> Option<Protocol> {
    Protocol::ALL
        .into_iter()
        .find(|p| adapter_for(*p).matches_response(body))
}

/// Copy canonical extra fields into an upstream body when the caller spoke the
/// same protocol, otherwise drop them with a note
pub(crate) fn carry_extra(
    body: &mut Map<String, Value>,
    request: &ChatRequest,
    target: Protocol,
    origin: Protocol,
    notes: &mut TranslationNotes,
) {
    for (key, value) in &request.extra {
        if origin == target {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        } else {
            notes.dropped(key, target);
        }
    }
}

/// Deserialize a normalized body into the canonical request
pub(crate) fn canonical_from(body: Map<String, Value>, protocol: Protocol) -> GatewayResult<ChatRequest> {
    serde_json::from_value(Value::Object(body)).map_err(|e| {
        gateway_core::GatewayError::validation(
            format!("invalid {protocol} request: {e}"),
            None,
            "invalid_request",
        )
    })
}

/// Require a JSON object body
pub(crate) fn object_body(body: &Value, protocol: Protocol) -> GatewayResult<Map<String, Value>> {
    body.as_object().cloned().ok_or_else(|| {
        gateway_core::GatewayError::validation(
            format!("{protocol} request body must be a JSON object"),
            None,
            "invalid_request",
        )
    })
}

/// Render a part with no slot in the target protocol as opaque JSON text
pub(crate) fn opaque_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Generate a tool call id
pub(crate) fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Read a `u32` field
pub(crate) fn u32_field(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}
