//! Lifecycle states of jobs and executions.
//!
//! The enums here describe which states exist and which moves between them
//! are expected. Terminality is what the store enforces; the transition graph
//! is advisory and used for diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when parsing an unknown state name
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown {kind} state: {value}")]
pub struct UnknownStateError {
    pub kind: &'static str,
    pub value: String,
}

/// Job-level lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStateType {
    New,
    InProgress,
    Cancelled,
    Error,
    PartialError,
    Completed,
}

impl JobStateType {
    pub const ALL: [JobStateType; 6] = [
        JobStateType::New,
        JobStateType::InProgress,
        JobStateType::Cancelled,
        JobStateType::Error,
        JobStateType::PartialError,
        JobStateType::Completed,
    ];

    /// `Completed`, `Error` and `Cancelled` are terminal. `PartialError` is
    /// not: a partially failed job may still be retried, cancelled or
    /// completed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStateType::Completed | JobStateType::Error | JobStateType::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStateType::New => "New",
            JobStateType::InProgress => "InProgress",
            JobStateType::Cancelled => "Cancelled",
            JobStateType::Error => "Error",
            JobStateType::PartialError => "PartialError",
            JobStateType::Completed => "Completed",
        }
    }

    /// Whether `next` is an expected successor of `self`
    pub fn can_transition_to(&self, next: JobStateType) -> bool {
        use JobStateType::*;
        match self {
            New => matches!(next, InProgress | Cancelled | Error),
            InProgress => matches!(next, Completed | Error | PartialError | Cancelled),
            PartialError => matches!(next, Completed | Error | Cancelled),
            Completed | Error | Cancelled => false,
        }
    }
}

impl fmt::Display for JobStateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStateType {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStateType::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStateError {
                kind: "job",
                value: s.to_string(),
            })
    }
}

/// Execution-level lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStateType {
    New,
    AskForBid,
    AskForBidAccepted,
    AskForBidRejected,
    BidAccepted,
    BidRejected,
    ResultProposed,
    ResultAccepted,
    ResultRejected,
    Completed,
    Failed,
    Canceled,
}

impl ExecutionStateType {
    pub const ALL: [ExecutionStateType; 12] = [
        ExecutionStateType::New,
        ExecutionStateType::AskForBid,
        ExecutionStateType::AskForBidAccepted,
        ExecutionStateType::AskForBidRejected,
        ExecutionStateType::BidAccepted,
        ExecutionStateType::BidRejected,
        ExecutionStateType::ResultProposed,
        ExecutionStateType::ResultAccepted,
        ExecutionStateType::ResultRejected,
        ExecutionStateType::Completed,
        ExecutionStateType::Failed,
        ExecutionStateType::Canceled,
    ];

    /// Terminal without a successful result
    pub fn is_discarded(&self) -> bool {
        matches!(
            self,
            ExecutionStateType::AskForBidRejected
                | ExecutionStateType::BidRejected
                | ExecutionStateType::ResultRejected
                | ExecutionStateType::Canceled
                | ExecutionStateType::Failed
        )
    }

    /// In flight on a compute node
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ExecutionStateType::BidAccepted
                | ExecutionStateType::ResultProposed
                | ExecutionStateType::ResultAccepted
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.is_discarded() || *self == ExecutionStateType::Completed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStateType::New => "New",
            ExecutionStateType::AskForBid => "AskForBid",
            ExecutionStateType::AskForBidAccepted => "AskForBidAccepted",
            ExecutionStateType::AskForBidRejected => "AskForBidRejected",
            ExecutionStateType::BidAccepted => "BidAccepted",
            ExecutionStateType::BidRejected => "BidRejected",
            ExecutionStateType::ResultProposed => "ResultProposed",
            ExecutionStateType::ResultAccepted => "ResultAccepted",
            ExecutionStateType::ResultRejected => "ResultRejected",
            ExecutionStateType::Completed => "Completed",
            ExecutionStateType::Failed => "Failed",
            ExecutionStateType::Canceled => "Canceled",
        }
    }

    /// Whether `next` is an expected successor of `self`
    pub fn can_transition_to(&self, next: ExecutionStateType) -> bool {
        use ExecutionStateType::*;
        match self {
            New => next == AskForBid,
            AskForBid => matches!(next, AskForBidAccepted | AskForBidRejected),
            AskForBidAccepted => matches!(next, BidAccepted | BidRejected | Canceled),
            BidAccepted => matches!(next, ResultProposed | Failed | BidRejected | Canceled),
            ResultProposed => matches!(next, ResultAccepted | ResultRejected | Failed | Canceled),
            ResultAccepted => matches!(next, Completed | Failed),
            AskForBidRejected | BidRejected | ResultRejected | Completed | Failed | Canceled => {
                false
            }
        }
    }
}

impl fmt::Display for ExecutionStateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStateType {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionStateType::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStateError {
                kind: "execution",
                value: s.to_string(),
            })
    }
}

/// One version of a job's progress. Every transition produces a new,
/// immutable `JobState`; the current state is the one with the highest
/// version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,

    pub state: JobStateType,

    /// Starts at 1 and grows by exactly 1 per accepted write
    pub version: u64,

    pub create_time: DateTime<Utc>,

    pub update_time: DateTime<Utc>,

    /// Deadline derived from the job's declared timeout
    pub timeout_at: Option<DateTime<Utc>>,
}

impl JobState {
    /// Initial state of a freshly created job
    pub fn new(
        job_id: impl Into<String>,
        now: DateTime<Utc>,
        timeout_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobStateType::New,
            version: 1,
            create_time: now,
            update_time: now,
            timeout_at,
        }
    }

    /// The version that follows this one, moved to `state`
    pub fn next(&self, state: JobStateType, now: DateTime<Utc>) -> JobState {
        JobState {
            job_id: self.job_id.clone(),
            state,
            version: self.version + 1,
            create_time: self.create_time,
            update_time: now,
            timeout_at: self.timeout_at,
        }
    }
}
