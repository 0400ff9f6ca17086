//! External probes: operator-supplied commands or HTTP endpoints that get
//! the final say on whether this node bids.

mod command;
mod http;

pub use command::ExecProbeStrategy;
pub use http::HttpProbeStrategy;

use crate::strategy::BidStrategyRequest;
use bacalhau_types::{ExecutionPlan, JobSpec};
use serde::{Deserialize, Serialize};

/// Environment variable carrying the probe payload for command probes
pub const PROBE_DATA_ENV: &str = "BACALHAU_JOB_SELECTION_PROBE_DATA";

/// JSON payload handed to a probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSelectionProbeData {
    pub node_id: String,
    pub job_id: String,
    pub spec: JobSpec,
    pub execution_plan: ExecutionPlan,
}

impl From<&BidStrategyRequest> for JobSelectionProbeData {
    fn from(request: &BidStrategyRequest) -> Self {
        Self {
            node_id: request.node_id.clone(),
            job_id: request.job.id.clone(),
            spec: request.job.spec.clone(),
            execution_plan: request.job.execution_plan.clone(),
        }
    }
}
