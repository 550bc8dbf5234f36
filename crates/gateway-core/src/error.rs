//! Error taxonomy for the gateway.
//!
//! Every failure that crosses a crate boundary is a [`GatewayError`]. Retry
//! decisions are made from [`GatewayError::class`], never from message text.

use crate::envelope::Stage;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classification that drives the pool state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad configuration: empty pool, missing model, invalid mapping. Never retried.
    Configuration,
    /// Rate limiting, 5xx, timeouts, connect failures. Advance to the next pool member.
    Transient,
    /// Unmappable part or malformed event. Isolated at the smallest granularity.
    Translation,
    /// Caller or upstream rejected the request itself. Abort.
    Fatal,
    /// Every pool member failed with a transient cause.
    Exhausted,
}

impl ErrorClass {
    /// Whether the pipeline manager should advance to the next pool member
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration problem detected at load time or request time
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },

    /// The caller's request is invalid
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem
        message: String,
        /// Offending field, when known
        field: Option<String>,
        /// Machine readable code
        code: String,
    },

    /// A payload could not be translated between protocols
    #[error("Translation error: {message}")]
    Translation {
        /// Description of the problem
        message: String,
    },

    /// Upstream provider returned an error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider id
        provider: String,
        /// Upstream message
        message: String,
        /// HTTP status code, when the failure came from a response
        status_code: Option<u16>,
        /// Whether the failure is transient
        retryable: bool,
    },

    /// Upstream rejected the credential
    #[error("Upstream authentication failed ({provider}): {message}")]
    Authentication {
        /// Provider id
        provider: String,
        /// Upstream message
        message: String,
    },

    /// No credential could be obtained for a key
    #[error("Credential unavailable for {provider}/{key}: {message}")]
    Credential {
        /// Provider id
        provider: String,
        /// Key id
        key: String,
        /// Reason
        message: String,
    },

    /// Upstream rate limited the request
    #[error("Rate limited by {provider}")]
    RateLimit {
        /// Provider id
        provider: String,
        /// Suggested wait before retrying
        retry_after: Option<Duration>,
    },

    /// An attempt or a stream read exceeded its deadline
    #[error("Timed out after {duration:?} ({phase})")]
    Timeout {
        /// Deadline that elapsed
        duration: Duration,
        /// What was being waited on
        phase: String,
    },

    /// Connecting to or talking to the upstream failed
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the failure
        message: String,
    },

    /// Reading an upstream stream failed
    #[error("Streaming error: {message}")]
    Streaming {
        /// Description of the failure
        message: String,
    },

    /// A pipeline stage failed; wraps the original cause
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Stage that produced the error
        stage: Stage,
        /// Original cause
        #[source]
        source: Box<GatewayError>,
    },

    /// Every member of the pool failed with a retryable error
    #[error("All {attempts} pipelines for category '{category}' failed")]
    Exhausted {
        /// Routing category
        category: String,
        /// Number of attempts made
        attempts: usize,
        /// Error of the last attempt
        last_error: Box<GatewayError>,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl GatewayError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create a translation error
    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create an upstream authentication error
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a credential error
    pub fn credential(
        provider: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Credential {
            provider: provider.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limit(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimit {
            provider: provider.into(),
            retry_after,
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: Duration, phase: impl Into<String>) -> Self {
        Self::Timeout {
            duration,
            phase: phase.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a streaming error
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap this error with the stage that produced it.
    ///
    /// Already wrapped errors keep their innermost stage.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } | Self::Exhausted { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Classify the error
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration { .. } => ErrorClass::Configuration,
            Self::Validation { .. } | Self::Internal { .. } => ErrorClass::Fatal,
            Self::Translation { .. } => ErrorClass::Translation,
            Self::Provider { retryable, .. } => {
                if *retryable {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            Self::Authentication { .. }
            | Self::Credential { .. }
            | Self::RateLimit { .. }
            | Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::Streaming { .. } => ErrorClass::Transient,
            Self::Stage { source, .. } => source.class(),
            Self::Exhausted { .. } => ErrorClass::Exhausted,
        }
    }

    /// Check if the pipeline manager should try the next pool member
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// The stage that produced the error, if it was wrapped
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error with stage wrappers removed
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the root cause invalidates the cached credential
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.root(), Self::Authentication { .. })
    }

    /// HTTP status to report to the caller
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.root() {
            Self::Configuration { .. } | Self::Internal { .. } | Self::Translation { .. } => 500,
            Self::Validation { .. } => 400,
            Self::Provider { status_code, .. } => match status_code {
                Some(code) if (400..500).contains(code) => *code,
                _ => 502,
            },
            Self::Authentication { .. } | Self::Credential { .. } => 502,
            Self::RateLimit { .. } => 429,
            Self::Timeout { .. } => 504,
            Self::Connection { .. } | Self::Streaming { .. } => 502,
            Self::Exhausted { last_error, .. } => {
                if matches!(last_error.root(), Self::RateLimit { .. }) {
                    429
                } else {
                    503
                }
            }
            Self::Stage { .. } => 500,
        }
    }

    /// Short machine readable error type
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self.root() {
            Self::Configuration { .. } => "configuration_error",
            Self::Validation { .. } => "invalid_request_error",
            Self::Translation { .. } => "translation_error",
            Self::Provider { .. } => "upstream_error",
            Self::Authentication { .. } | Self::Credential { .. } => "upstream_authentication_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Connection { .. } | Self::Streaming { .. } => "upstream_connection_error",
            Self::Exhausted { .. } => "service_unavailable",
            Self::Internal { .. } | Self::Stage { .. } => "internal_error",
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::translation(format!("JSON error: {err}"))
    }
}
