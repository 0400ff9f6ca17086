use anyhow::Context;
use bacalhau_bidstrategy::{
    AvailableCapacityStrategy, CapacityTracker, ChainedBidStrategy, EngineRegistry,
    ExecProbeStrategy, HttpProbeStrategy, InputLocalityStrategy, LocalCapacityTracker,
    MappedProviders, MaxCapacityStrategy, NetworkingStrategy, Provider, ProvidersInstalledStrategy,
    StaticProvider, StatelessJobStrategy, StorageProvider, StorageRegistry, TimeoutStrategy,
};
use bacalhau_config::{NodeConfig, StoreBackend, StoreConfig};
use bacalhau_jobstore::{InMemoryJobStore, JobStore, JobWithInfo, RocksDbJobStore, SqliteJobStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
/// Records emitted through `log` are forwarded as well.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("invalid log level {}", default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

pub async fn open_job_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    let store: Arc<dyn JobStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryJobStore::in_memory()),
        StoreBackend::Rocksdb => {
            let path = config.path.as_ref().context("store.path is required for rocksdb")?;
            let store = RocksDbJobStore::open_rocksdb(path)
                .with_context(|| format!("failed to open rocksdb store at {}", path.display()))?;
            Arc::new(store)
        }
        StoreBackend::Sqlite => {
            let path = config.path.as_ref().context("store.path is required for sqlite")?;
            Arc::new(
                SqliteJobStore::open_sqlite(path)
                    .with_context(|| format!("failed to open sqlite store at {}", path.display()))?,
            )
        }
    };
    tracing::info!(backend = ?config.backend, "Opened job store");
    Ok(store)
}

fn static_registry(kind: &'static str, installed: &[String]) -> Arc<EngineRegistry> {
    let mut registry: MappedProviders<dyn Provider> = MappedProviders::new(kind);
    for key in installed {
        registry.insert(key.clone(), Arc::new(StaticProvider::installed()));
    }
    Arc::new(registry)
}

fn storage_registry(installed: &[String], local_inputs: &[String]) -> Arc<StorageRegistry> {
    let mut registry: MappedProviders<dyn StorageProvider> = MappedProviders::new("storage");
    for key in installed {
        let provider = StaticProvider::installed().with_local_sources(local_inputs.iter().cloned());
        registry.insert(key.clone(), Arc::new(provider));
    }
    Arc::new(registry)
}

/// Assemble the admission chain described by `config.compute`.
///
/// Cheap static checks come first, then capacity, and the external probes
/// last.
pub fn build_bid_strategy(
    config: &NodeConfig,
    running: Arc<dyn CapacityTracker>,
    enqueued: Arc<dyn CapacityTracker>,
) -> anyhow::Result<ChainedBidStrategy> {
    let compute = &config.compute;
    let policy = &compute.job_selection;
    let providers = &compute.providers;
    let storages = storage_registry(&providers.storages, &providers.local_inputs);

    let mut chain = ChainedBidStrategy::new()
        .with(NetworkingStrategy::new(
            policy.accept_networked_jobs,
            policy.allowed_domains.clone(),
        ))
        .with(
            TimeoutStrategy::new(
                Duration::from_secs(compute.timeouts.min_job_execution_timeout_secs),
                Duration::from_secs(compute.timeouts.max_job_execution_timeout_secs),
            )
            .with_bypass(compute.timeouts.bypass_client_ids.iter().cloned()),
        )
        .with(StatelessJobStrategy::new(policy.reject_stateless_jobs))
        .with(ProvidersInstalledStrategy::new(
            static_registry("engine", &providers.engines),
            static_registry("verifier", &providers.verifiers),
            static_registry("publisher", &providers.publishers),
            storages.clone(),
        ))
        .with(InputLocalityStrategy::new(policy.locality, storages));

    if let Some(job_max) = compute.job_max()? {
        chain = chain.with(MaxCapacityStrategy::new(job_max));
    }
    chain = chain.with(AvailableCapacityStrategy::new(running, enqueued));

    if let Some(command) = &policy.probe_exec {
        chain = chain.with(ExecProbeStrategy::new(command.clone(), compute.probe_timeout()));
    }
    if let Some(url) = &policy.probe_http {
        chain = chain.with(
            HttpProbeStrategy::new(url.clone(), compute.probe_timeout())
                .context("failed to build http probe")?,
        );
    }

    Ok(chain)
}

/// Load the jobs that were in flight when the node stopped and book the
/// resources of executions this node was still running.
pub async fn recover_in_progress(
    store: &dyn JobStore,
    node_id: &str,
    running: &dyn CapacityTracker,
) -> anyhow::Result<Vec<JobWithInfo>> {
    let jobs = store
        .get_in_progress_jobs()
        .await
        .context("failed to load in-progress jobs")?;

    for info in &jobs {
        let active_here = info
            .executions
            .iter()
            .filter(|execution| execution.id.node_id == node_id && execution.state.is_active())
            .count();
        for _ in 0..active_here {
            if !running.reserve(&info.job.spec.resources) {
                tracing::warn!(
                    job_id = %info.job.id,
                    "Recovered execution does not fit in the configured capacity"
                );
            }
        }
        tracing::debug!(
            job_id = %info.job.id,
            state = %info.state.state,
            executions = info.executions.len(),
            "Recovered job"
        );
    }

    tracing::info!(count = jobs.len(), "Recovered in-progress jobs");
    Ok(jobs)
}

/// Everything a running node holds on to
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<dyn JobStore>,
    pub bid_strategy: Arc<ChainedBidStrategy>,
    pub running: Arc<LocalCapacityTracker>,
    pub enqueued: Arc<LocalCapacityTracker>,
    pub recovered: Vec<JobWithInfo>,
    /// Registry holding the admission metrics of this node
    #[cfg(feature = "metrics")]
    pub registry: prometheus::Registry,
}

impl Node {
    /// Open the store, recover in-flight work and assemble the admission
    /// chain. Does not install logging.
    pub async fn start(config: NodeConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let total = config.compute.total_capacity()?;
        let running = Arc::new(LocalCapacityTracker::new(total));
        let enqueued = Arc::new(LocalCapacityTracker::new(total));

        let store = open_job_store(&config.store).await?;
        let recovered =
            recover_in_progress(store.as_ref(), &config.node.id, running.as_ref()).await?;

        #[allow(unused_mut)]
        let mut chain = build_bid_strategy(&config, running.clone(), enqueued.clone())?;
        #[cfg(feature = "metrics")]
        let registry = prometheus::Registry::new();
        #[cfg(feature = "metrics")]
        chain.set_metrics(
            bacalhau_bidstrategy::BidStrategyMetrics::new(&registry)
                .context("failed to register bid metrics")?,
        );
        tracing::info!(strategies = ?chain.names(), "Assembled bid strategy chain");

        Ok(Self {
            config,
            store,
            bid_strategy: Arc::new(chain),
            running,
            enqueued,
            recovered,
            #[cfg(feature = "metrics")]
            registry,
        })
    }
}

pub async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    init_tracing(&config.logging.level)?;
    tracing::info!(node_id = %config.node.id, "Starting node");

    let _node = Node::start(config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    tracing::info!("Shutdown signal received. Exiting.");
    Ok(())
}
