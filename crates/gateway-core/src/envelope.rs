//! Envelopes that travel through a pipeline.

use crate::error::{ErrorClass, GatewayError};
use crate::protocol::Protocol;
use crate::request::ChatRequest;
use crate::streaming::ByteStream;
use crate::types::{ModelId, PipelineId, ProviderId, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// One of the four fixed pipeline stages, in request order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Protocol switch
    LlmSwitch,
    /// Streaming control
    Workflow,
    /// Compatibility field mapper
    Compatibility,
    /// Provider transport
    Provider,
}

impl Stage {
    /// Stages in request order
    pub const ORDER: [Self; 4] = [
        Self::LlmSwitch,
        Self::Workflow,
        Self::Compatibility,
        Self::Provider,
    ];

    /// Stable stage name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LlmSwitch => "llm-switch",
            Self::Workflow => "workflow",
            Self::Compatibility => "compatibility",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller payload plus routing hints, as received by the HTTP surface.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Raw caller body
    pub body: Value,
    /// Request path
    pub path: String,
    /// Lower-cased request headers relevant to routing and detection
    pub headers: HashMap<String, String>,
    /// Correlation id
    pub request_id: RequestId,
    /// Explicit protocol hint
    pub protocol_hint: Option<Protocol>,
    /// Explicit routing category
    pub category: Option<String>,
    /// Model taken from the path (Gemini style endpoints)
    pub model: Option<String>,
    /// Streaming flag taken from the path (Gemini style endpoints)
    pub stream: Option<bool>,
    /// Per-request stage timing requested
    pub debug: bool,
}

impl RouteRequest {
    /// Create a route request for a body received on `path`
    #[must_use]
    pub fn new(body: Value, path: impl Into<String>) -> Self {
        Self {
            body,
            path: path.into(),
            headers: HashMap::new(),
            request_id: RequestId::generate(),
            protocol_hint: None,
            category: None,
            model: None,
            stream: None,
            debug: false,
        }
    }

    /// Set the correlation id
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Add a header (name is lower-cased)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the protocol hint
    #[must_use]
    pub fn with_protocol_hint(mut self, protocol: Protocol) -> Self {
        self.protocol_hint = Some(protocol);
        self
    }

    /// Set the routing category
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set model and streaming flag from the path
    #[must_use]
    pub fn with_path_model(mut self, model: impl Into<String>, stream: bool) -> Self {
        self.model = Some(model.into());
        self.stream = Some(stream);
        self
    }

    /// Enable stage timing
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Header lookup (case insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Routing part of the canonical envelope
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    /// Provider bound for the current attempt
    pub provider_id: Option<ProviderId>,
    /// Model bound for the current attempt
    pub model_id: Option<ModelId>,
    /// Correlation id; never changed by a stage
    pub request_id: RequestId,
    /// Time the call entered the gateway
    pub timestamp: DateTime<Utc>,
}

/// Timing of one stage in one direction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    /// Stage
    pub stage: Stage,
    /// `request` or `response`
    pub direction: &'static str,
    /// Elapsed time
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Per-request debug settings
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugInfo {
    /// Whether stage timings are recorded
    pub enabled: bool,
    /// Recorded timings
    pub stages: Vec<StageTiming>,
}

impl DebugInfo {
    /// Record a timing if debugging is enabled
    pub fn record(&mut self, stage: Stage, direction: &'static str, elapsed: Duration) {
        if self.enabled {
            self.stages.push(StageTiming {
                stage,
                direction,
                elapsed,
            });
        }
    }
}

/// Canonical envelope handed from stage to stage
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Protocol-neutral body
    pub data: ChatRequest,
    /// Routing information
    pub route: RouteInfo,
    /// Stage annotations
    pub metadata: Map<String, Value>,
    /// Debug settings
    pub debug: DebugInfo,
}

impl PipelineRequest {
    /// Wrap a canonical request
    #[must_use]
    pub fn new(data: ChatRequest, request_id: RequestId) -> Self {
        Self {
            data,
            route: RouteInfo {
                provider_id: None,
                model_id: None,
                request_id,
                timestamp: Utc::now(),
            },
            metadata: Map::new(),
            debug: DebugInfo::default(),
        }
    }

    /// Correlation id
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.route.request_id
    }

    /// Whether the caller asked for a stream
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.data.stream
    }
}

/// A non-fatal failure surfaced in response metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageError {
    /// Stage that produced it
    pub stage: Stage,
    /// Pipeline the stage belonged to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<PipelineId>,
    /// Human readable cause
    pub message: String,
    /// Classification of the cause
    #[serde(serialize_with = "serialize_class")]
    pub class: ErrorClass,
}

impl StageError {
    /// Note from a stage that did not fail the request
    #[must_use]
    pub fn note(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            pipeline_id: None,
            message: message.into(),
            class: ErrorClass::Translation,
        }
    }

    /// Record a failed pipeline attempt
    #[must_use]
    pub fn from_error(pipeline_id: &PipelineId, error: &GatewayError) -> Self {
        Self {
            stage: error.stage().unwrap_or(Stage::Provider),
            pipeline_id: Some(pipeline_id.clone()),
            message: error.root().to_string(),
            class: error.class(),
        }
    }
}

fn serialize_class<S: serde::Serializer>(class: &ErrorClass, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(match class {
        ErrorClass::Configuration => "configuration",
        ErrorClass::Transient => "transient",
        ErrorClass::Translation => "translation",
        ErrorClass::Fatal => "fatal",
        ErrorClass::Exhausted => "exhausted",
    })
}

/// Caller-native response body
pub enum ResponseData {
    /// Complete JSON body
    Json(Value),
    /// Server-sent event bytes
    Sse(ByteStream),
}

impl ResponseData {
    /// Whether the body is a stream
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Sse(_))
    }
}

impl fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Sse(_) => f.write_str("Sse(..)"),
        }
    }
}

/// Metadata of a pipeline response
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    /// Pipeline that produced the response
    pub pipeline_id: PipelineId,
    /// Caller protocol of the response
    pub protocol: Protocol,
    /// Wall time spent inside the gateway before the body was ready
    #[serde(with = "duration_ms")]
    pub processing_time: Duration,
    /// Stage timings, empty unless debugging was requested
    pub stages: Vec<StageTiming>,
    /// Correlation id
    pub request_id: RequestId,
    /// Recoverable failures, including failed earlier attempts
    pub errors: Vec<StageError>,
    /// Number of pipelines tried, including the successful one
    pub attempts: usize,
    /// Debugging was requested by header or body flag
    pub debug: bool,
}

/// Response returned by a pipeline
#[derive(Debug)]
pub struct PipelineResponse {
    /// Caller-native body
    pub data: ResponseData,
    /// Response metadata
    pub metadata: ResponseMetadata,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        s.serialize_u64(d.as_millis() as u64)
    }
}
