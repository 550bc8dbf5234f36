//! The protocol switch: caller protocol in, upstream protocol out, and back.

use crate::adapter::{adapter_for, detect_response_protocol, EncoderContext, TranslationNotes};
use crate::correlation::{CorrelationGuard, CorrelationMap};
use crate::detection::{Detection, ProtocolDetector};
use crate::internal::{has_internal_keys, strip_internal_keys, InternalHints};
use crate::stream::{encode_stream, normalize_stream, PayloadHook, SseNormalizer};
use gateway_config::GatewayConfig;
use gateway_core::{
    ByteStream, CanonicalResponse, EventStream, GatewayError, GatewayResult, PipelineRequest,
    Protocol, RequestId, ResponseData, RouteRequest, Stage, StageError,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key holding the caller protocol
pub const CALLER_PROTOCOL_KEY: &str = "caller_protocol";
/// Metadata key holding the explicit routing category
pub const CATEGORY_KEY: &str = "route_category";

/// A parsed inbound request
#[derive(Debug)]
pub struct Incoming {
    /// Canonical envelope
    pub request: PipelineRequest,
    /// Detection outcome
    pub detection: Detection,
    /// Lossy steps taken while parsing
    pub notes: Vec<StageError>,
    /// Keeps the correlation entry alive until the response is rendered
    pub guard: CorrelationGuard,
}

/// An error already rendered in a caller protocol's shape
#[derive(Debug)]
pub struct RenderedError {
    /// HTTP status
    pub status: u16,
    /// Caller-native error body
    pub body: Value,
    /// Protocol of `body`
    pub protocol: Protocol,
    /// Underlying error
    pub error: GatewayError,
}

/// Upstream result handed back to the switch for rendering
pub enum Outgoing<'a> {
    /// Complete response; `upstream_body` is used for shape re-detection
    Complete {
        /// Canonical response
        response: &'a CanonicalResponse,
        /// Raw upstream JSON, when available
        upstream_body: Option<&'a Value>,
    },
    /// Canonical event stream
    Stream {
        /// Events
        events: EventStream,
        /// Model reported to the caller
        model: String,
    },
}

/// Protocol detection plus bidirectional translation
#[derive(Debug)]
pub struct LlmSwitch {
    detector: ProtocolDetector,
    correlation: Arc<CorrelationMap>,
    default_protocol: Protocol,
}

impl LlmSwitch {
    /// Build from config
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_correlation(config, CorrelationMap::new(config.detection.correlation_capacity))
    }

    /// Build from config around an existing correlation map.
    ///
    /// Used on reload so requests in flight keep their entries.
    #[must_use]
    pub fn with_correlation(config: &GatewayConfig, correlation: Arc<CorrelationMap>) -> Self {
        Self {
            detector: ProtocolDetector::from_config(config),
            correlation,
            default_protocol: config.detection.default_protocol,
        }
    }

    /// The correlation map
    #[must_use]
    pub fn correlation(&self) -> &Arc<CorrelationMap> {
        &self.correlation
    }

    /// Detect the caller protocol and parse the body into a canonical envelope.
    ///
    /// The detected protocol is recorded against the request id. Parse failures
    /// are rendered in the detected protocol's error shape.
    pub fn process_incoming(&self, route: &RouteRequest) -> Result<Incoming, RenderedError> {
        let detection = self.detector.detect(route);
        let protocol = detection.protocol;
        let hints = InternalHints::from_body(&route.body);

        let mut body = route.body.clone();
        let stripped = strip_internal_keys(&mut body);
        if stripped > 0 {
            debug!(request_id = %route.request_id, stripped, "Removed internal keys from caller body");
        }

        let mut notes = TranslationNotes::new();
        let mut data = adapter_for(protocol)
            .parse_request(&body, &mut notes)
            .map_err(|e| self.render_error(protocol, e.in_stage(Stage::LlmSwitch)))?;
        if let Some(model) = &route.model {
            if data.model.is_empty() {
                data.model.clone_from(model);
            }
        }
        if let Some(stream) = route.stream {
            data.stream = stream;
        }

        let mut request = PipelineRequest::new(data, route.request_id.clone());
        request
            .metadata
            .insert(CALLER_PROTOCOL_KEY.into(), Value::String(protocol.as_str().into()));
        if let Some(category) = route.category.clone().or(hints.category) {
            request.metadata.insert(CATEGORY_KEY.into(), Value::String(category));
        }
        request.debug.enabled = route.debug || hints.debug;

        let guard = self.correlation.record(route.request_id.clone(), protocol);
        Ok(Incoming {
            request,
            detection,
            notes: notes_to_errors(notes),
            guard,
        })
    }

    /// Canonical request to the body `upstream` expects for `model`.
    ///
    /// Internal keys never survive this call.
    pub fn transform_request(
        &self,
        request: &PipelineRequest,
        upstream: Protocol,
        model: &str,
    ) -> GatewayResult<(Value, Vec<StageError>)> {
        let origin = caller_protocol(request)
            .or_else(|| self.correlation.peek(request.request_id()))
            .unwrap_or(self.default_protocol);
        let mut notes = TranslationNotes::new();
        let mut body = adapter_for(upstream)
            .build_request(&request.data, model, origin, &mut notes)
            .map_err(|e| e.in_stage(Stage::LlmSwitch))?;
        strip_internal_keys(&mut body);
        debug_assert!(!has_internal_keys(&body));
        Ok((body, notes_to_errors(notes)))
    }

    /// Upstream JSON to canonical response
    pub fn decode_response(&self, upstream: Protocol, body: &Value) -> GatewayResult<CanonicalResponse> {
        adapter_for(upstream)
            .parse_response(body)
            .map_err(|e| e.in_stage(Stage::LlmSwitch))
    }

    /// Upstream SSE bytes to canonical events
    pub fn decode_stream(
        &self,
        upstream: Protocol,
        bytes: ByteStream,
        hook: Option<PayloadHook>,
    ) -> EventStream {
        let mut normalizer = SseNormalizer::new(adapter_for(upstream).stream_decoder());
        if let Some(hook) = hook {
            normalizer = normalizer.with_payload_hook(hook);
        }
        normalize_stream(bytes, normalizer)
    }

    /// Render the upstream result in the caller's protocol and release the
    /// correlation entry.
    pub fn process_outgoing(&self, request_id: &RequestId, outgoing: Outgoing<'_>) -> (Protocol, ResponseData) {
        let recorded = self.correlation.take(request_id);
        match outgoing {
            Outgoing::Complete {
                response,
                upstream_body,
            } => {
                let protocol = recorded.unwrap_or_else(|| {
                    let detected = upstream_body
                        .and_then(detect_response_protocol)
                        .unwrap_or(self.default_protocol);
                    warn!(
                        request_id = %request_id,
                        protocol = %detected,
                        confidence = "degraded",
                        "No recorded protocol, re-detected from response shape"
                    );
                    detected
                });
                let body = adapter_for(protocol).render_response(response);
                (protocol, ResponseData::Json(body))
            }
            Outgoing::Stream { events, model } => {
                let protocol = recorded.unwrap_or_else(|| {
                    warn!(
                        request_id = %request_id,
                        protocol = %self.default_protocol,
                        confidence = "degraded",
                        "No recorded protocol for stream, using default"
                    );
                    self.default_protocol
                });
                let encoder = adapter_for(protocol)
                    .stream_encoder(EncoderContext::new(response_id_prefix(protocol), model));
                (protocol, ResponseData::Sse(encode_stream(events, encoder)))
            }
        }
    }

    /// Render `error` for the caller of `request_id`, releasing its correlation entry
    pub fn render_error_for(&self, request_id: &RequestId, error: GatewayError) -> RenderedError {
        let protocol = self.correlation.take(request_id).unwrap_or(self.default_protocol);
        self.render_error(protocol, error)
    }

    /// Render `error` for a request that never reached parsing
    #[must_use]
    pub fn reject(&self, route: &RouteRequest, error: GatewayError) -> RenderedError {
        self.render_error(self.detector.detect(route).protocol, error)
    }

    /// Render `error` in `protocol`'s error shape
    #[must_use]
    pub fn render_error(&self, protocol: Protocol, error: GatewayError) -> RenderedError {
        let status = error.status_code();
        let body = adapter_for(protocol).render_error(status, error.error_type(), &error.root().to_string());
        RenderedError {
            status,
            body,
            protocol,
            error,
        }
    }
}

/// Caller protocol stored in the envelope metadata
#[must_use]
pub fn caller_protocol(request: &PipelineRequest) -> Option<Protocol> {
    request
        .metadata
        .get(CALLER_PROTOCOL_KEY)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn response_id_prefix(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::OpenAiChat => "chatcmpl-",
        Protocol::OpenAiResponses => "resp_",
        Protocol::AnthropicMessages => "msg_",
        Protocol::Gemini => "",
    }
}

fn notes_to_errors(notes: TranslationNotes) -> Vec<StageError> {
    notes
        .into_vec()
        .into_iter()
        .map(|n| StageError::note(Stage::LlmSwitch, n))
        .collect()
}
