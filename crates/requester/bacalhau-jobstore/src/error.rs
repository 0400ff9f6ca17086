use bacalhau_types::{ExecutionId, ExecutionStateType, JobStateType};
use thiserror::Error;

/// Why an update condition did not hold
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    #[error("expected state {expected}, found {actual}")]
    State { expected: String, actual: String },

    #[error("state {actual} is excluded by the condition")]
    UnexpectedState { actual: String },

    #[error("expected version {expected}, found {actual}")]
    Version { expected: u64, actual: u64 },

    /// Another writer appended this version first
    #[error("version {version} was written concurrently")]
    ConcurrentWrite { version: u64 },
}

/// Errors that can occur in the job store
#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job already exists: {0}")]
    JobAlreadyExists(String),

    #[error("job {job_id} is already {current}, cannot move to {attempted}")]
    JobAlreadyTerminal {
        job_id: String,
        current: JobStateType,
        attempted: JobStateType,
    },

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("execution already exists: {0}")]
    ExecutionAlreadyExists(ExecutionId),

    #[error("execution {execution_id} is already {current}, cannot move to {attempted}")]
    ExecutionAlreadyTerminal {
        execution_id: ExecutionId,
        current: ExecutionStateType,
        attempted: ExecutionStateType,
    },

    #[error("condition mismatch on {aggregate}: {mismatch}")]
    ConditionMismatch { aggregate: String, mismatch: Mismatch },

    #[error("job id prefix {prefix} is ambiguous, matches: {}", .matches.join(", "))]
    AmbiguousJobId { prefix: String, matches: Vec<String> },

    #[error("history of {aggregate} is broken: expected version {expected}, found {found}")]
    HistoryGap {
        aggregate: String,
        expected: u64,
        found: u64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[cfg(feature = "rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl JobStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JobStoreError::JobNotFound(_) | JobStoreError::ExecutionNotFound(_)
        )
    }

    /// A lost optimistic-concurrency race; re-read and retry
    pub fn is_condition_mismatch(&self) -> bool {
        matches!(self, JobStoreError::ConditionMismatch { .. })
    }

    /// The aggregate was already finished, usually by a concurrent path
    pub fn is_already_terminal(&self) -> bool {
        matches!(
            self,
            JobStoreError::JobAlreadyTerminal { .. }
                | JobStoreError::ExecutionAlreadyTerminal { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            JobStoreError::JobAlreadyExists(_) | JobStoreError::ExecutionAlreadyExists(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JobStoreError>;
