//! Credential sources and the per-pipeline credential cache.

use async_trait::async_trait;
use gateway_config::{GatewayConfig, KeySource};
use gateway_core::{Credential, CredentialProvider, GatewayError, GatewayResult, KeyId, ProviderId};
use parking_lot::RwLock;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Credentials taken from the provider `keys` sections of the config.
///
/// Environment variables are read at fetch time, so rotated values are
/// picked up on the next cache refresh.
#[derive(Debug, Default)]
pub struct StaticCredentialProvider {
    keys: HashMap<(String, String), KeySource>,
}

impl StaticCredentialProvider {
    /// Collect every key of every provider
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let keys = config
            .providers
            .iter()
            .flat_map(|(provider, p)| {
                p.keys
                    .iter()
                    .map(move |(key, source)| ((provider.clone(), key.clone()), source.clone()))
            })
            .collect();
        Self { keys }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self, provider: &ProviderId, key: &KeyId) -> GatewayResult<Credential> {
        let source = self
            .keys
            .get(&(provider.to_string(), key.to_string()))
            .ok_or_else(|| GatewayError::credential(provider.as_str(), key.as_str(), "unknown key"))?;
        if let Some(value) = &source.value {
            return Ok(Credential::new(value.expose_secret().clone()));
        }
        if let Some(var) = &source.env {
            return std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Credential::new)
                .ok_or_else(|| {
                    GatewayError::credential(
                        provider.as_str(),
                        key.as_str(),
                        format!("environment variable {var} is not set"),
                    )
                });
        }
        Err(GatewayError::credential(
            provider.as_str(),
            key.as_str(),
            "key has neither a value nor an env source",
        ))
    }
}

/// Caches the credential of one pipeline.
///
/// The lock is never held across the credential provider call.
pub struct CredentialCache {
    source: Arc<dyn CredentialProvider>,
    provider: ProviderId,
    key: KeyId,
    cached: RwLock<Option<Credential>>,
}

impl CredentialCache {
    /// Create an empty cache for `(provider, key)`
    #[must_use]
    pub fn new(source: Arc<dyn CredentialProvider>, provider: ProviderId, key: KeyId) -> Self {
        Self {
            source,
            provider,
            key,
            cached: RwLock::new(None),
        }
    }

    /// Cached credential, fetching it on first use
    pub async fn get(&self) -> GatewayResult<Credential> {
        if let Some(credential) = self.cached.read().clone() {
            return Ok(credential);
        }
        debug!(provider = %self.provider, key = %self.key, "Fetching credential");
        let credential = self.source.credential(&self.provider, &self.key).await?;
        *self.cached.write() = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential so the next attempt re-fetches it
    pub fn invalidate(&self) {
        if self.cached.write().take().is_some() {
            info!(provider = %self.provider, key = %self.key, "Invalidated cached credential");
        }
    }

    /// Whether a credential is cached
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached.read().is_some()
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("provider", &self.provider)
            .field("key", &self.key)
            .field("cached", &self.is_cached())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::ProviderConfig;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl CredentialProvider for Counting {
        async fn credential(&self, _: &ProviderId, _: &KeyId) -> GatewayResult<Credential> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new(format!("token-{n}")))
        }
    }

    #[tokio::test]
    async fn test_cache_refetches_after_invalidate() {
        let source = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = CredentialCache::new(source.clone(), ProviderId::new("p").unwrap(), KeyId::new("k").unwrap());
        assert_eq!(cache.get().await.unwrap().expose(), "token-0");
        assert_eq!(cache.get().await.unwrap().expose(), "token-0");
        cache.invalidate();
        assert!(!cache.is_cached());
        assert_eq!(cache.get().await.unwrap().expose(), "token-1");
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_provider_sources() {
        let mut config = GatewayConfig::default();
        let mut provider: ProviderConfig = serde_json::from_value(serde_json::json!({
            "protocol": "openai-chat",
            "endpoint": "https://api.openai.com/v1"
        }))
        .unwrap();
        provider.keys.insert(
            "inline".into(),
            KeySource {
                value: Some(SecretString::new("sk-1".into())),
                env: None,
            },
        );
        provider.keys.insert(
            "missing".into(),
            KeySource {
                value: None,
                env: Some("GATEWAY_TEST_SURELY_UNSET_VAR".into()),
            },
        );
        config.providers.insert("openai".into(), provider);

        let source = StaticCredentialProvider::from_config(&config);
        let p = ProviderId::new("openai").unwrap();
        assert_eq!(source.credential(&p, &KeyId::new("inline").unwrap()).await.unwrap().expose(), "sk-1");
        assert!(source.credential(&p, &KeyId::new("missing").unwrap()).await.is_err());
        assert!(source.credential(&p, &KeyId::new("nope").unwrap()).await.is_err());
    }
}
