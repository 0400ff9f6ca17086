use crate::execution::ExecutionId;
use crate::state::{ExecutionStateType, JobStateType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The transition a history entry records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum HistoryEvent {
    Job {
        /// `None` for the entry that created the job
        previous: Option<JobStateType>,
        new: JobStateType,
    },
    Execution {
        execution_id: ExecutionId,
        /// `None` for the entry that created the execution
        previous: Option<ExecutionStateType>,
        new: ExecutionStateType,
    },
}

/// Write-once record of one accepted transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job_id: String,

    pub event: HistoryEvent,

    /// Version of the aggregate after this transition
    pub new_version: u64,

    pub comment: String,

    pub time: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn is_job_level(&self) -> bool {
        matches!(self.event, HistoryEvent::Job { .. })
    }

    pub fn is_execution_level(&self) -> bool {
        !self.is_job_level()
    }

    pub fn execution_id(&self) -> Option<&ExecutionId> {
        match &self.event {
            HistoryEvent::Execution { execution_id, .. } => Some(execution_id),
            HistoryEvent::Job { .. } => None,
        }
    }

    /// Key of the aggregate this entry belongs to: the job ID for job-level
    /// entries, the full execution ID otherwise
    pub fn aggregate_key(&self) -> String {
        match &self.event {
            HistoryEvent::Job { .. } => self.job_id.clone(),
            HistoryEvent::Execution { execution_id, .. } => execution_id.to_string(),
        }
    }
}
