//! Typed configuration model.

use gateway_core::Protocol;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Root gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Logging and tracing
    pub logging: LoggingSection,
    /// Protocol detection
    pub detection: DetectionConfig,
    /// Backoff between pool attempts
    pub retry: RetryConfig,
    /// Deadlines
    pub timeouts: TimeoutConfig,
    /// Routing category resolution
    pub routing: RoutingConfig,
    /// Upstream providers by id
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Compatibility profiles by name
    pub compatibility: BTreeMap<String, CompatibilityProfile>,
    /// Pipeline pools by routing category
    pub pools: BTreeMap<String, Vec<PoolEntry>>,
}

impl GatewayConfig {
    /// Whether any provider or pool is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty() || !self.pools.is_empty()
    }

    /// Pool entries of a category in retry order: ascending priority, ties by declaration order
    #[must_use]
    pub fn ordered_pool(&self, category: &str) -> Vec<&PoolEntry> {
        let mut entries: Vec<&PoolEntry> = self
            .pools
            .get(category)
            .map(|p| p.iter().collect())
            .unwrap_or_default();
        // sort_by_key is stable, so declaration order breaks ties
        entries.sort_by_key(|e| e.priority);
        entries
    }

    /// Endpoint list for a protocol, falling back to the built-in defaults
    #[must_use]
    pub fn endpoints_for(&self, protocol: Protocol) -> Vec<String> {
        self.detection.endpoints.get(&protocol).map_or_else(
            || {
                protocol
                    .default_endpoints()
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect()
            },
            Clone::clone,
        )
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum request body size in bytes
    pub request_body_limit: usize,
    /// Time allowed for in-flight requests at shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5506,
            request_body_limit: 10 * 1024 * 1024,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging and tracing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level filter (`RUST_LOG` wins when set)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// OpenTelemetry export
    pub otel: OtelConfig,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            otel: OtelConfig::default(),
        }
    }
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelConfig {
    /// Whether spans are exported
    pub enabled: bool,
    /// Head sampling ratio
    pub sampling_ratio: f64,
    /// Service name resource attribute
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sampling_ratio: 1.0,
            service_name: "llm-pipeline-gateway".to_string(),
        }
    }
}

/// A detection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionRule {
    /// Explicit metadata hint
    Hint,
    /// Endpoint path match
    Endpoint,
    /// Body shape heuristics
    Content,
    /// Header inspection
    Header,
}

/// Protocol detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Rules in order of preference
    pub order: Vec<DetectionRule>,
    /// Protocol used when no rule matches
    pub default_protocol: Protocol,
    /// Endpoint paths per protocol
    pub endpoints: BTreeMap<Protocol, Vec<String>>,
    /// Upper bound of concurrently tracked requests
    pub correlation_capacity: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            order: vec![
                DetectionRule::Hint,
                DetectionRule::Endpoint,
                DetectionRule::Content,
                DetectionRule::Header,
            ],
            default_protocol: Protocol::OpenAiChat,
            endpoints: BTreeMap::new(),
            correlation_capacity: 65_536,
        }
    }
}

/// Backoff between pool attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Delay cap
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Random jitter factor (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

/// Deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-attempt deadline up to the first response byte
    #[serde(with = "humantime_serde")]
    pub attempt: Duration,
    /// TCP/TLS connect deadline
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// Maximum gap between two stream chunks
    #[serde(with = "humantime_serde")]
    pub stream_idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt: Duration::from_secs(120),
            connect: Duration::from_secs(10),
            stream_idle: Duration::from_secs(300),
        }
    }
}

/// Routing category resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Category used when nothing else matches
    pub default_category: String,
    /// Estimated prompt tokens above which `longcontext` is inferred
    pub long_context_threshold: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_category: "default".to_string(),
            long_context_threshold: 60_000,
        }
    }
}

/// How the credential is attached to upstream requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `x-api-key: <key>`
    XApiKey,
    /// `x-goog-api-key: <key>`
    GoogApiKey,
    /// `?key=<key>`
    QueryKey,
    /// No credential
    None,
}

/// Streaming transport offered by an upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingSupport {
    /// Streaming and non-streaming
    #[default]
    Both,
    /// Streaming only
    Always,
    /// Non-streaming only
    Never,
}

/// Source of one key's secret
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySource {
    /// Inline secret
    #[serde(skip_serializing)]
    pub value: Option<SecretString>,
    /// Environment variable holding the secret
    pub env: Option<String>,
}

/// One upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Native protocol of the upstream
    pub protocol: Protocol,
    /// Base URL
    pub endpoint: String,
    /// Credential placement
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// Streaming capability
    #[serde(default)]
    pub streaming: StreamingSupport,
    /// Static headers added to every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Cloud Code project; switches Gemini upstreams to the `v1internal` envelope
    #[serde(default)]
    pub cloud_code_project: Option<String>,
    /// Keys by id
    #[serde(default)]
    pub keys: BTreeMap<String, KeySource>,
    /// Compatibility profile name
    #[serde(default)]
    pub compatibility: Option<String>,
}

/// Where a value is taken from or written to: a dotted JSON path (`a.b.0.c`)
pub type FieldPath = String;

/// Typed value conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Any scalar to string
    String,
    /// Numeric string or number to float
    Number,
    /// Numeric string or number to integer
    Integer,
    /// `"true"`/`"false"`/numbers to bool
    Boolean,
    /// Wrap a scalar into a one element array
    Array,
    /// Lower-case a string
    Lowercase,
    /// Upper-case a string
    Uppercase,
    /// Serialize any value into a JSON string
    JsonString,
    /// Parse a JSON string into a value
    ParseJson,
}

/// One mapping primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingRule {
    /// `to = from`
    Copy {
        /// Source path
        from: FieldPath,
        /// Target path
        to: FieldPath,
    },
    /// `to = via(from)`
    Convert {
        /// Source path
        from: FieldPath,
        /// Target path
        to: FieldPath,
        /// Conversion
        via: Conversion,
    },
    /// `to = value` when `to` is absent
    Default {
        /// Target path
        to: FieldPath,
        /// Value to fill
        value: Value,
    },
}

/// Provider specific field adjustments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityProfile {
    /// Rules applied to upstream request bodies, in order
    pub request: Vec<MappingRule>,
    /// Rules applied to upstream response bodies and stream events, in order
    pub response: Vec<MappingRule>,
    /// Paths removed from request bodies after mapping
    pub strip_request_fields: Vec<FieldPath>,
    /// Paths removed from response bodies after mapping
    pub strip_response_fields: Vec<FieldPath>,
}

impl CompatibilityProfile {
    /// Whether the profile changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
            && self.response.is_empty()
            && self.strip_request_fields.is_empty()
            && self.strip_response_fields.is_empty()
    }
}

/// One member of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Provider id
    pub provider: String,
    /// Upstream model
    pub model: String,
    /// Key id
    pub key: String,
    /// Lower runs first
    #[serde(default = "default_priority")]
    pub priority: i32,
}

const fn default_priority() -> i32 {
    100
}
