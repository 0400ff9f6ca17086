//! Registries of engines, verifiers, publishers and storages, and the
//! strategy that rejects jobs needing something this node lacks.

use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use bacalhau_types::StorageSpec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Anything that can be installed on a node
#[async_trait]
pub trait Provider: Send + Sync {
    async fn is_installed(&self) -> Result<bool, BidStrategyError>;
}

/// A storage provider can also tell whether a volume is already local
#[async_trait]
pub trait StorageProvider: Provider {
    async fn has_storage_locally(&self, spec: &StorageSpec) -> Result<bool, BidStrategyError>;
}

/// Lookup of providers by key, e.g. "docker" or "ipfs"
pub trait ProviderRegistry<P: ?Sized>: Send + Sync {
    fn has(&self, key: &str) -> bool;

    fn get(&self, key: &str) -> Result<Arc<P>, BidStrategyError>;

    fn keys(&self) -> Vec<String>;
}

/// Registry backed by a map
pub struct MappedProviders<P: ?Sized> {
    kind: &'static str,
    providers: HashMap<String, Arc<P>>,
}

impl<P: ?Sized> MappedProviders<P> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            providers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, provider: Arc<P>) {
        self.providers.insert(key.into(), provider);
    }
}

impl<P: ?Sized + Send + Sync> ProviderRegistry<P> for MappedProviders<P> {
    fn has(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Arc<P>, BidStrategyError> {
        self.providers
            .get(key)
            .cloned()
            .ok_or_else(|| BidStrategyError::ProviderNotFound {
                kind: self.kind,
                key: key.to_string(),
            })
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Provider whose answers are fixed at construction. Used for nodes that
/// declare their installed components in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    installed: bool,
    /// Sources considered resident on this node
    local_sources: HashSet<String>,
}

impl StaticProvider {
    pub fn installed() -> Self {
        Self {
            installed: true,
            local_sources: HashSet::new(),
        }
    }

    pub fn not_installed() -> Self {
        Self::default()
    }

    pub fn with_local_sources(mut self, sources: impl IntoIterator<Item = String>) -> Self {
        self.local_sources.extend(sources);
        self
    }
}

#[async_trait]
impl Provider for StaticProvider {
    async fn is_installed(&self) -> Result<bool, BidStrategyError> {
        Ok(self.installed)
    }
}

#[async_trait]
impl StorageProvider for StaticProvider {
    async fn has_storage_locally(&self, spec: &StorageSpec) -> Result<bool, BidStrategyError> {
        Ok(self.local_sources.contains(&spec.source))
    }
}

pub type EngineRegistry = dyn ProviderRegistry<dyn Provider>;
pub type StorageRegistry = dyn ProviderRegistry<dyn StorageProvider>;

/// Rejects jobs whose engine, verifier, publisher or input storages are
/// not installed here
pub struct ProvidersInstalledStrategy {
    engines: Arc<EngineRegistry>,
    verifiers: Arc<EngineRegistry>,
    publishers: Arc<EngineRegistry>,
    storages: Arc<StorageRegistry>,
}

impl ProvidersInstalledStrategy {
    pub fn new(
        engines: Arc<EngineRegistry>,
        verifiers: Arc<EngineRegistry>,
        publishers: Arc<EngineRegistry>,
        storages: Arc<StorageRegistry>,
    ) -> Self {
        Self {
            engines,
            verifiers,
            publishers,
            storages,
        }
    }
}

async fn provider_installed(
    registry: &EngineRegistry,
    key: &str,
) -> Result<bool, BidStrategyError> {
    if !registry.has(key) {
        return Ok(false);
    }
    registry.get(key)?.is_installed().await
}

fn not_installed(kind: &str, key: &str) -> BidStrategyResponse {
    BidStrategyResponse::reject(format!("{} {} is not installed", kind, key))
}

#[async_trait]
impl BidStrategy for ProvidersInstalledStrategy {
    fn name(&self) -> &str {
        "providers_installed"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let spec = &request.job.spec;

        if !provider_installed(self.engines.as_ref(), &spec.engine.engine_type).await? {
            return Ok(not_installed("engine", &spec.engine.engine_type));
        }

        // Verifier and publisher are optional on a job spec
        if !spec.verifier.is_empty()
            && !provider_installed(self.verifiers.as_ref(), &spec.verifier).await?
        {
            return Ok(not_installed("verifier", &spec.verifier));
        }
        if !spec.publisher.is_empty()
            && !provider_installed(self.publishers.as_ref(), &spec.publisher).await?
        {
            return Ok(not_installed("publisher", &spec.publisher));
        }

        for input in &spec.inputs {
            let key = &input.storage_source;
            let installed = self.storages.has(key) && self.storages.get(key)?.is_installed().await?;
            if !installed {
                return Ok(not_installed("storage", key));
            }
        }

        Ok(BidStrategyResponse::accept())
    }
}
