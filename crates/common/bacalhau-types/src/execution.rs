use crate::state::ExecutionStateType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one node's attempt at running a job
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId {
    pub job_id: String,
    pub node_id: String,
    pub compute_reference: String,
}

impl ExecutionId {
    pub fn new(
        job_id: impl Into<String>,
        node_id: impl Into<String>,
        compute_reference: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            node_id: node_id.into(),
            compute_reference: compute_reference.into(),
        }
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.job_id, self.node_id, self.compute_reference)
    }
}

/// Output captured from the execution engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set when the engine itself failed, as opposed to the workload
    #[serde(default)]
    pub error_msg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub complete: bool,
    pub result: bool,
}

/// One version of an execution's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub id: ExecutionId,

    pub state: ExecutionStateType,

    /// Starts at 1 and grows by exactly 1 per accepted write
    pub version: u64,

    /// Whether the compute node answered the ask-for-bid positively
    #[serde(default)]
    pub accepted_ask_for_bid: bool,

    #[serde(default)]
    pub run_output: Option<RunCommandResult>,

    /// Location of the published result, e.g. a CID
    #[serde(default)]
    pub published_result: Option<String>,

    #[serde(default)]
    pub verification_result: Option<VerificationResult>,

    pub create_time: DateTime<Utc>,

    pub update_time: DateTime<Utc>,
}

impl ExecutionState {
    /// Version 1 of an execution
    pub fn new(id: ExecutionId, state: ExecutionStateType, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state,
            version: 1,
            accepted_ask_for_bid: false,
            run_output: None,
            published_result: None,
            verification_result: None,
            create_time: now,
            update_time: now,
        }
    }

    /// Next version: `update` merged over `self`, unset fields inherited
    pub fn apply(&self, update: &ExecutionUpdate, now: DateTime<Utc>) -> ExecutionState {
        ExecutionState {
            id: self.id.clone(),
            state: update.state.unwrap_or(self.state),
            version: self.version + 1,
            accepted_ask_for_bid: update
                .accepted_ask_for_bid
                .unwrap_or(self.accepted_ask_for_bid),
            run_output: update
                .run_output
                .clone()
                .or_else(|| self.run_output.clone()),
            published_result: update
                .published_result
                .clone()
                .or_else(|| self.published_result.clone()),
            verification_result: update
                .verification_result
                .clone()
                .or_else(|| self.verification_result.clone()),
            create_time: self.create_time,
            update_time: now,
        }
    }
}

/// Values to merge onto the latest [`ExecutionState`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub state: Option<ExecutionStateType>,
    pub accepted_ask_for_bid: Option<bool>,
    pub run_output: Option<RunCommandResult>,
    pub published_result: Option<String>,
    pub verification_result: Option<VerificationResult>,
}

impl ExecutionUpdate {
    /// An update that only moves the state
    pub fn to_state(state: ExecutionStateType) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}
