use crate::error::Result;
use async_trait::async_trait;
use bacalhau_types::{ExecutionId, ExecutionState, HistoryEntry, Job, JobState};

/// An atomic append. Either every row of a commit becomes visible or none
/// does.
#[derive(Debug, Clone)]
pub enum Commit {
    /// Conflicts if the job already exists
    CreateJob {
        job: Job,
        state: JobState,
        history: HistoryEntry,
    },

    /// Conflicts if `state.version` already exists for the job
    JobState { state: JobState, history: HistoryEntry },

    /// Conflicts if `state.version` already exists for the execution
    Execution {
        state: ExecutionState,
        history: HistoryEntry,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A row with the same key was already there; nothing was written
    Conflict,
}

/// Persistence primitive under [`VersionedJobStore`](crate::VersionedJobStore).
///
/// Backends only store and read rows. Versioning, conditions and
/// terminality are decided by the store, so every backend behaves the
/// same as long as `commit` is atomic and never overwrites a row.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    async fn load_job(&self, job_id: &str) -> Result<Option<Job>>;

    async fn list_jobs(&self) -> Result<Vec<Job>>;

    async fn list_job_ids(&self) -> Result<Vec<String>>;

    /// Highest version of the job's state
    async fn latest_job_state(&self, job_id: &str) -> Result<Option<JobState>>;

    /// Highest version of every execution of the job
    async fn latest_execution_states(&self, job_id: &str) -> Result<Vec<ExecutionState>>;

    async fn latest_execution_state(&self, id: &ExecutionId) -> Result<Option<ExecutionState>>;

    /// Every history entry of the job, ordered by time and then commit order
    async fn history(&self, job_id: &str) -> Result<Vec<HistoryEntry>>;

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome>;
}
