//! Pool definitions built from configuration.
//!
//! A [`PoolSet`] is immutable once built. Reconfiguration builds a new set
//! and swaps it in whole; requests in flight keep the set they started with.

use crate::compatibility::CompatibilityMapper;
use crate::pipeline::Pipeline;
use arc_swap::ArcSwap;
use gateway_config::{ConfigHandle, GatewayConfig, RoutingConfig};
use gateway_core::{CredentialProvider, GatewayError, GatewayResult, KeyId, ModelId, PipelineId, ProviderId};
use gateway_protocols::{CorrelationMap, LlmSwitch};
use gateway_providers::{CredentialCache, ProviderTransport, StaticCredentialProvider};
use gateway_resilience::{AttemptTimeout, Backoff};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Ordered, equivalent pipelines of one routing category
pub type Pool = Arc<[Arc<Pipeline>]>;

/// Everything a request needs, frozen for its lifetime
#[derive(Debug)]
pub struct PoolSet {
    switch: Arc<LlmSwitch>,
    pools: BTreeMap<String, Pool>,
    routing: RoutingConfig,
    backoff: Backoff,
    timeout: AttemptTimeout,
}

impl PoolSet {
    /// Build every pool of `config`.
    ///
    /// Providers share one transport each; every pipeline gets its own
    /// credential cache.
    pub fn build(
        config: &GatewayConfig,
        correlation: Arc<CorrelationMap>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> GatewayResult<Self> {
        let switch = Arc::new(LlmSwitch::with_correlation(config, correlation));

        let mut transports = BTreeMap::new();
        for (name, provider) in &config.providers {
            let id = ProviderId::new(name.as_str())?;
            let transport = ProviderTransport::new(id, provider.clone(), &config.timeouts)?;
            transports.insert(name.clone(), Arc::new(transport));
        }

        let mut pools = BTreeMap::new();
        for category in config.pools.keys() {
            let mut members = Vec::new();
            for entry in config.ordered_pool(category) {
                let transport = transports.get(&entry.provider).ok_or_else(|| {
                    GatewayError::configuration(format!(
                        "pool '{category}' references unknown provider '{}'",
                        entry.provider
                    ))
                })?;
                let compatibility = match &transport.config().compatibility {
                    Some(name) => {
                        let profile = config.compatibility.get(name).ok_or_else(|| {
                            GatewayError::configuration(format!("unknown compatibility profile '{name}'"))
                        })?;
                        CompatibilityMapper::new(name.as_str(), profile.clone())
                    }
                    None => CompatibilityMapper::passthrough(),
                };
                let provider = transport.id().clone();
                let key = KeyId::new(entry.key.as_str())?;
                let cache = CredentialCache::new(credentials.clone(), provider.clone(), key.clone());
                members.push(Arc::new(Pipeline::new(
                    &provider,
                    ModelId::new(entry.model.as_str())?,
                    &key,
                    switch.clone(),
                    transport.clone(),
                    cache,
                    compatibility,
                )));
            }
            pools.insert(category.clone(), Pool::from(members));
        }

        Ok(Self {
            switch,
            pools,
            routing: config.routing.clone(),
            backoff: Backoff::new(&config.retry),
            timeout: AttemptTimeout::new(config.timeouts.attempt),
        })
    }

    /// Protocol switch for this configuration
    #[must_use]
    pub fn switch(&self) -> &Arc<LlmSwitch> {
        &self.switch
    }

    /// Pool of a category
    #[must_use]
    pub fn pool(&self, category: &str) -> Option<Pool> {
        self.pools.get(category).cloned()
    }

    /// Whether `category` has a non-empty pool
    #[must_use]
    pub fn has_pool(&self, category: &str) -> bool {
        self.pools.get(category).is_some_and(|p| !p.is_empty())
    }

    /// Categories with their pipeline ids in retry order
    pub fn categories(&self) -> impl Iterator<Item = (&str, Vec<&PipelineId>)> {
        self.pools
            .iter()
            .map(|(category, pool)| (category.as_str(), pool.iter().map(|p| p.id()).collect()))
    }

    /// Distinct upstream models across all pools
    #[must_use]
    pub fn models(&self) -> BTreeSet<&str> {
        self.pools
            .values()
            .flat_map(|pool| pool.iter().map(|p| p.model().as_str()))
            .collect()
    }

    /// Ready when the default category and every other pool have members
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.has_pool(&self.routing.default_category) && self.pools.values().all(|p| !p.is_empty())
    }

    /// Routing settings
    #[must_use]
    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Backoff between attempts
    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Deadline of one attempt
    #[must_use]
    pub fn timeout(&self) -> AttemptTimeout {
        self.timeout
    }
}

/// Current pool set, replaced atomically on reconfiguration
pub struct PoolRegistry {
    current: ArcSwap<PoolSet>,
    correlation: Arc<CorrelationMap>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl PoolRegistry {
    /// Registry reading credentials from the provider `keys` sections
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::build(config, None)
    }

    /// Registry using an external credential source
    pub fn with_credential_provider(
        config: &GatewayConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> GatewayResult<Self> {
        Self::build(config, Some(credentials))
    }

    fn build(config: &GatewayConfig, credentials: Option<Arc<dyn CredentialProvider>>) -> GatewayResult<Self> {
        let correlation = CorrelationMap::new(config.detection.correlation_capacity);
        let source = Self::source(config, credentials.as_ref());
        let set = PoolSet::build(config, correlation.clone(), source)?;
        info!(pools = set.pools.len(), "Pool registry built");
        Ok(Self {
            current: ArcSwap::from_pointee(set),
            correlation,
            credentials,
        })
    }

    fn source(
        config: &GatewayConfig,
        credentials: Option<&Arc<dyn CredentialProvider>>,
    ) -> Arc<dyn CredentialProvider> {
        credentials.cloned().unwrap_or_else(|| Arc::new(StaticCredentialProvider::from_config(config)))
    }

    /// Snapshot used for one request
    #[must_use]
    pub fn snapshot(&self) -> Arc<PoolSet> {
        self.current.load_full()
    }

    /// The correlation map shared across reloads
    #[must_use]
    pub fn correlation(&self) -> &Arc<CorrelationMap> {
        &self.correlation
    }

    /// Build a new pool set and swap it in.
    ///
    /// On error the previous set stays active.
    pub fn rebuild(&self, config: &GatewayConfig) -> GatewayResult<()> {
        let source = Self::source(config, self.credentials.as_ref());
        let set = PoolSet::build(config, self.correlation.clone(), source)?;
        self.current.store(Arc::new(set));
        Ok(())
    }

    /// Rebuild whenever `handle` publishes a new configuration
    pub fn follow(self: &Arc<Self>, handle: ConfigHandle) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut versions = handle.subscribe();
        tokio::spawn(async move {
            while versions.changed().await.is_ok() {
                let version = *versions.borrow_and_update();
                match registry.rebuild(&handle.load()) {
                    Ok(()) => info!(version, "Pools rebuilt"),
                    Err(e) => error!(version, error = %e, "Pool rebuild failed, keeping previous pools"),
                }
            }
        })
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("current", &self.current.load())
            .field("in_flight", &self.correlation.len())
            .finish_non_exhaustive()
    }
}
