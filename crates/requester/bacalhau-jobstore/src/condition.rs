use crate::error::Mismatch;
use bacalhau_types::{ExecutionId, ExecutionStateType, ExecutionUpdate, JobStateType};
use std::fmt::Display;

/// Optimistic-concurrency predicate over the state an update is based on.
/// Every set field must hold; an empty condition always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCondition<S> {
    pub expected_state: Option<S>,
    pub unexpected_states: Vec<S>,
    pub expected_version: Option<u64>,
}

impl<S> Default for UpdateCondition<S> {
    fn default() -> Self {
        Self {
            expected_state: None,
            unexpected_states: Vec::new(),
            expected_version: None,
        }
    }
}

impl<S: Copy + PartialEq + Display> UpdateCondition<S> {
    /// A condition that always holds
    pub fn any() -> Self {
        Self::default()
    }

    pub fn expect_state(state: S) -> Self {
        Self {
            expected_state: Some(state),
            ..Self::default()
        }
    }

    pub fn expect_version(version: u64) -> Self {
        Self {
            expected_version: Some(version),
            ..Self::default()
        }
    }

    pub fn and_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn and_not(mut self, state: S) -> Self {
        self.unexpected_states.push(state);
        self
    }

    pub fn check(&self, current: S, version: u64) -> Result<(), Mismatch> {
        if let Some(expected) = self.expected_state {
            if expected != current {
                return Err(Mismatch::State {
                    expected: expected.to_string(),
                    actual: current.to_string(),
                });
            }
        }
        if self.unexpected_states.contains(&current) {
            return Err(Mismatch::UnexpectedState {
                actual: current.to_string(),
            });
        }
        if let Some(expected) = self.expected_version {
            if expected != version {
                return Err(Mismatch::Version {
                    expected,
                    actual: version,
                });
            }
        }
        Ok(())
    }
}

/// Move a job to a new state
#[derive(Debug, Clone)]
pub struct UpdateJobStateRequest {
    /// Full job ID; prefixes are not resolved for writes
    pub job_id: String,
    pub new_state: JobStateType,
    pub condition: UpdateCondition<JobStateType>,
    pub comment: String,
}

impl UpdateJobStateRequest {
    pub fn new(job_id: impl Into<String>, new_state: JobStateType) -> Self {
        Self {
            job_id: job_id.into(),
            new_state,
            condition: UpdateCondition::default(),
            comment: String::new(),
        }
    }

    pub fn with_condition(mut self, condition: UpdateCondition<JobStateType>) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Merge new values onto an execution
#[derive(Debug, Clone)]
pub struct UpdateExecutionRequest {
    pub execution_id: ExecutionId,
    pub condition: UpdateCondition<ExecutionStateType>,
    pub update: ExecutionUpdate,
    pub comment: String,
}

impl UpdateExecutionRequest {
    pub fn new(execution_id: ExecutionId, update: ExecutionUpdate) -> Self {
        Self {
            execution_id,
            condition: UpdateCondition::default(),
            update,
            comment: String::new(),
        }
    }

    /// Shorthand for an update that only moves the state
    pub fn to_state(execution_id: ExecutionId, state: ExecutionStateType) -> Self {
        Self::new(execution_id, ExecutionUpdate::to_state(state))
    }

    pub fn with_condition(mut self, condition: UpdateCondition<ExecutionStateType>) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}
