//! Credential collaborator contract.

use crate::error::GatewayResult;
use crate::types::{KeyId, ProviderId};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// A bearer token or API key for one `(provider, key)` pair
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a secret
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::new(secret.into()))
    }

    /// Expose the secret for header construction
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Yields credentials on demand.
///
/// Implementations may perform I/O (token refresh); callers must not hold
/// locks across `credential`.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch the credential for a key
    ///
    /// # Errors
    /// Returns a credential error if the key is unknown or cannot be resolved
    async fn credential(&self, provider: &ProviderId, key: &KeyId) -> GatewayResult<Credential>;
}
