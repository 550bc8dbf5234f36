//! Validated identifier newtypes.
//!
//! Identifiers cross every crate boundary in the gateway, so they are wrapped
//! to keep a provider id from being passed where a key id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier
            ///
            /// # Errors
            /// Returns error if the identifier is empty or only whitespace
            pub fn new(value: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(crate::error::GatewayError::configuration(format!(
                        "{} cannot be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a configured upstream provider
    ProviderId
);
string_id!(
    /// Upstream model identifier
    ModelId
);
string_id!(
    /// Identifier of one credential (API key / account) of a provider
    KeyId
);

/// Globally unique identifier of one inbound call.
///
/// Used as the correlation key for protocol detection and retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request id
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("req_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Wrap a caller supplied correlation id.
    ///
    /// Blank values fall back to a generated id.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self::generate()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Borrow the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one concrete pipeline: `provider.model.key`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Build the id from the bound triple
    #[must_use]
    pub fn from_parts(provider: &ProviderId, model: &ModelId, key: &KeyId) -> Self {
        Self(format!("{provider}.{model}.{key}"))
    }

    /// Borrow the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ids_rejected() {
        assert!(ProviderId::new("").is_err());
        assert!(ModelId::new("   ").is_err());
        assert!(KeyId::new("key1").is_ok());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("req_"));
    }

    #[test]
    fn test_request_id_from_blank_header_generates() {
        let id = RequestId::from_header("  ");
        assert!(id.as_str().starts_with("req_"));
        assert_eq!(RequestId::from_header("abc").as_str(), "abc");
    }

    #[test]
    fn test_pipeline_id_format() {
        let id = PipelineId::from_parts(
            &ProviderId::new("openai").unwrap(),
            &ModelId::new("gpt-4o").unwrap(),
            &KeyId::new("key1").unwrap(),
        );
        assert_eq!(id.as_str(), "openai.gpt-4o.key1");
    }
}
