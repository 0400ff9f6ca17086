use async_trait::async_trait;
use bacalhau_types::{Job, ResourceUsage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A bid opportunity offered to this node
#[derive(Debug, Clone)]
pub struct BidStrategyRequest {
    pub node_id: String,
    pub job: Job,
}

impl BidStrategyRequest {
    pub fn new(node_id: impl Into<String>, job: Job) -> Self {
        Self {
            node_id: node_id.into(),
            job,
        }
    }
}

/// Answer of a single strategy or a whole chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidStrategyResponse {
    pub should_bid: bool,
    #[serde(default)]
    pub reason: String,
}

impl BidStrategyResponse {
    pub fn accept() -> Self {
        Self {
            should_bid: true,
            reason: String::new(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            should_bid: false,
            reason: reason.into(),
        }
    }
}

/// Hard failures while deciding. A strategy that merely says "no" returns
/// a rejecting [`BidStrategyResponse`] instead.
#[derive(Error, Debug)]
pub enum BidStrategyError {
    #[error("failed to launch probe command `{command}`: {source}")]
    ProbeLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("probe command I/O failed: {0}")]
    ProbeIo(#[from] std::io::Error),

    #[error("{probe} probe timed out after {timeout:?}")]
    ProbeTimeout { probe: &'static str, timeout: Duration },

    #[error("http probe failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to encode probe payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider {kind} {key} is not registered")]
    ProviderNotFound { kind: &'static str, key: String },

    #[error("provider error: {0}")]
    Provider(String),
}

/// A single admission policy
#[async_trait]
pub trait BidStrategy: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &str;

    /// Decide on the job's declared specification
    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError>;

    /// Decide once the concrete resource usage is known. Strategies that
    /// do not look at resources accept.
    async fn decide_on_usage(
        &self,
        _request: &BidStrategyRequest,
        _usage: &ResourceUsage,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        Ok(BidStrategyResponse::accept())
    }
}
