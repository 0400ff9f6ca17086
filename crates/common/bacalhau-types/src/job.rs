use crate::resources::ResourceUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A unit of submitted work. Immutable once created; only its
/// [`JobState`](crate::JobState) changes over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job ID
    pub id: String,

    /// Submitter metadata
    pub metadata: JobMetadata,

    /// What to run and with which resources
    pub spec: JobSpec,

    /// How the job is split across executions
    #[serde(default)]
    pub execution_plan: ExecutionPlan,
}

/// Who submitted the job and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Client that submitted the job
    pub client_id: String,

    /// Requester node that accepted the submission
    #[serde(default)]
    pub requester_node_id: String,

    /// Submission time
    pub created_at: DateTime<Utc>,
}

/// Engine and resource specification of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    /// Execution engine and its parameters
    pub engine: EngineSpec,

    /// Verifier that checks results (e.g. "noop", "deterministic")
    pub verifier: String,

    /// Publisher that stores results (e.g. "ipfs", "s3")
    pub publisher: String,

    /// Declared resource estimate
    pub resources: ResourceUsage,

    /// Input volumes
    pub inputs: Vec<StorageSpec>,

    /// Output volumes
    pub outputs: Vec<StorageSpec>,

    /// Network access requested by the job
    pub network: NetworkConfig,

    /// Execution timeout in seconds, 0 means unbounded
    pub timeout_secs: u64,

    /// Free-form tags used for filtering
    pub annotations: Vec<String>,
}

/// Execution engine selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Engine key, e.g. "docker" or "wasm"
    pub engine_type: String,

    /// Engine-specific parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A storage volume, either an input the job reads or an output it writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    /// Storage provider key, e.g. "ipfs" or "urldownload"
    pub storage_source: String,

    /// Volume name
    #[serde(default)]
    pub name: String,

    /// Content identifier or URL
    #[serde(default)]
    pub source: String,

    /// Mount path inside the execution
    #[serde(default)]
    pub path: String,
}

/// Kind of network access
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// No network access
    #[default]
    None,
    /// Unrestricted network access
    Full,
    /// HTTP(S) access to an explicit list of domains
    Http,
}

/// Network access requested by a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub kind: Network,

    /// Domains reachable under [`Network::Http`]
    pub domains: Vec<String>,
}

/// Sharding plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub shards_total: u32,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self { shards_total: 1 }
    }
}

impl Job {
    /// Create a job submitted now by `client_id`
    pub fn new(id: impl Into<String>, client_id: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            id: id.into(),
            metadata: JobMetadata {
                client_id: client_id.into(),
                requester_node_id: String::new(),
                created_at: Utc::now(),
            },
            spec,
            execution_plan: ExecutionPlan::default(),
        }
    }

    /// Declared execution timeout, `None` if unbounded
    pub fn timeout(&self) -> Option<Duration> {
        match self.spec.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// True if the job declares no inputs
    pub fn is_stateless(&self) -> bool {
        self.spec.inputs.is_empty()
    }

    pub fn has_annotation(&self, tag: &str) -> bool {
        self.spec.annotations.iter().any(|a| a == tag)
    }
}
