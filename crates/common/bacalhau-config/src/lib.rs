use anyhow::{bail, Context};
use bacalhau_types::{JobSelectionPolicy, ResourceConfig, ResourceUsage};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file when no CLI argument is given
pub const CONFIG_PATH_ENV: &str = "BACALHAU_NODE_CONFIG_PATH";

/// Config file used when neither the CLI nor the environment name one
pub const DEFAULT_CONFIG_PATH: &str = "bacalhau-node.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct NodeConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NodeSection {
    /// Node ID, used as `node_id` in bid requests and execution IDs
    pub id: String,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Rocksdb,
    Sqlite,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory (RocksDB) or file (SQLite); required by persistent backends
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ComputeConfig {
    /// Resources this node offers in total
    #[serde(default)]
    pub total_capacity: ResourceConfig,

    /// Largest request a single job may make
    pub job_max: Option<ResourceConfig>,

    #[serde(default)]
    pub job_selection: JobSelectionPolicy,

    /// Upper bound on a single probe invocation
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            total_capacity: ResourceConfig::default(),
            job_max: None,
            job_selection: JobSelectionPolicy::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
            timeouts: TimeoutConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    10
}

/// Bounds on the execution timeout a job may declare. Zero disables a bound.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    pub min_job_execution_timeout_secs: u64,
    pub max_job_execution_timeout_secs: u64,
    /// Clients allowed to exceed the maximum
    pub bypass_client_ids: Vec<String>,
}

/// What is installed on this node
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub engines: Vec<String>,
    pub verifiers: Vec<String>,
    pub publishers: Vec<String>,
    pub storages: Vec<String>,
    /// Input sources (CIDs, URLs) already resident on this node
    pub local_inputs: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ComputeConfig {
    pub fn total_capacity(&self) -> anyhow::Result<ResourceUsage> {
        self.total_capacity
            .parse()
            .context("invalid compute.total_capacity")
    }

    pub fn job_max(&self) -> anyhow::Result<Option<ResourceUsage>> {
        self.job_max
            .as_ref()
            .map(|max| max.parse().context("invalid compute.job_max"))
            .transpose()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl NodeConfig {
    /// Check everything serde cannot check on its own
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.id.trim().is_empty() {
            bail!("node.id must not be empty");
        }
        if self.node.id.contains('/') {
            bail!("node.id must not contain '/': {}", self.node.id);
        }

        match self.store.backend {
            StoreBackend::Memory => {}
            StoreBackend::Rocksdb | StoreBackend::Sqlite if self.store.path.is_none() => {
                bail!("store.path is required for the {:?} backend", self.store.backend);
            }
            _ => {}
        }

        let timeouts = &self.compute.timeouts;
        if timeouts.max_job_execution_timeout_secs > 0
            && timeouts.min_job_execution_timeout_secs > timeouts.max_job_execution_timeout_secs
        {
            bail!(
                "compute.timeouts: min ({}) exceeds max ({})",
                timeouts.min_job_execution_timeout_secs,
                timeouts.max_job_execution_timeout_secs
            );
        }

        if self.compute.probe_timeout_secs == 0 {
            bail!("compute.probe_timeout_secs must be positive");
        }

        self.compute.total_capacity()?;
        self.compute.job_max()?;
        Ok(())
    }
}

/// Where to read the node configuration from
#[derive(Debug)]
pub struct CliArgs {
    pub config_path: String,
}

impl CliArgs {
    /// First CLI argument, else `BACALHAU_NODE_CONFIG_PATH`, else the default
    pub fn parse() -> Self {
        Self::from_sources(std::env::args().nth(1), std::env::var(CONFIG_PATH_ENV).ok())
    }

    fn from_sources(arg: Option<String>, env: Option<String>) -> Self {
        let config_path = arg
            .or(env)
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self { config_path }
    }
}

pub fn parse_node_config(content: &str) -> anyhow::Result<NodeConfig> {
    let config: NodeConfig = toml::from_str(content).context("failed to parse node config")?;
    config.validate()?;
    Ok(config)
}

pub fn load_node_config(path: &str) -> anyhow::Result<NodeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file from {}", path))?;
    parse_node_config(&content).with_context(|| format!("invalid config file {}", path))
}
