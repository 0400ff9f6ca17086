use crate::backend::{Commit, CommitOutcome, StorageBackend};
use crate::condition::{UpdateExecutionRequest, UpdateJobStateRequest};
use crate::error::{JobStoreError, Mismatch, Result};
use crate::history::{filter_history, JobHistoryFilter};
use crate::query::JobQuery;
use async_trait::async_trait;
use bacalhau_types::{
    validate_id, ExecutionId, ExecutionState, ExecutionStateType, HistoryEntry, HistoryEvent, Job,
    JobState,
};
use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info};

/// A job that has not reached a terminal state, with everything needed to
/// resume tracking it
#[derive(Debug, Clone, PartialEq)]
pub struct JobWithInfo {
    pub job: Job,
    pub state: JobState,
    pub executions: Vec<ExecutionState>,
    pub history: Vec<HistoryEntry>,
}

/// Requester-side record of jobs, executions and every transition between
/// their states.
///
/// Reads accept an abbreviated job ID as long as it identifies exactly one
/// job. Writes require full IDs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job with its initial `New` state
    async fn create_job(&self, job: Job) -> Result<()>;

    async fn get_job(&self, job_id: &str) -> Result<Job>;

    async fn get_job_state(&self, job_id: &str) -> Result<JobState>;

    async fn get_jobs(&self, query: &JobQuery) -> Result<Vec<Job>>;

    /// Every job whose latest state is not terminal
    async fn get_in_progress_jobs(&self) -> Result<Vec<JobWithInfo>>;

    /// Latest version of every execution of the job
    async fn get_executions(&self, job_id: &str) -> Result<Vec<ExecutionState>>;

    async fn get_execution(&self, execution_id: &ExecutionId) -> Result<ExecutionState>;

    async fn get_job_history(
        &self,
        job_id: &str,
        filter: &JobHistoryFilter,
    ) -> Result<Vec<HistoryEntry>>;

    async fn update_job_state(&self, request: UpdateJobStateRequest) -> Result<JobState>;

    async fn create_execution(
        &self,
        execution_id: ExecutionId,
        initial_state: ExecutionStateType,
    ) -> Result<ExecutionState>;

    async fn update_execution(&self, request: UpdateExecutionRequest) -> Result<ExecutionState>;
}

/// [`JobStore`] over any [`StorageBackend`].
///
/// Each write reads the latest version of one aggregate, checks it, and
/// appends the next version together with its history entry in a single
/// commit. Nothing is locked between the read and the commit: a commit
/// that loses the race is reported as a condition mismatch.
pub struct VersionedJobStore<B> {
    backend: B,
}

impl<B: StorageBackend> VersionedJobStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Exact match first, then a unique prefix
    async fn resolve_job_id(&self, job_id: &str) -> Result<String> {
        if job_id.is_empty() {
            return Err(JobStoreError::InvalidInput("job id must not be empty".to_string()));
        }
        if self.backend.load_job(job_id).await?.is_some() {
            return Ok(job_id.to_string());
        }

        let mut matches: Vec<String> = self
            .backend
            .list_job_ids()
            .await?
            .into_iter()
            .filter(|id| id.starts_with(job_id))
            .collect();
        match matches.len() {
            0 => Err(JobStoreError::JobNotFound(job_id.to_string())),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                Err(JobStoreError::AmbiguousJobId {
                    prefix: job_id.to_string(),
                    matches,
                })
            }
        }
    }

    async fn latest_job_state(&self, job_id: &str) -> Result<JobState> {
        self.backend
            .latest_job_state(job_id)
            .await?
            .ok_or_else(|| JobStoreError::JobNotFound(job_id.to_string()))
    }
}

/// Current time at the precision every backend stores
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

fn invalid(message: String) -> JobStoreError {
    JobStoreError::InvalidInput(message)
}

fn validate_execution_id(id: &ExecutionId) -> Result<()> {
    validate_id("job id", &id.job_id).map_err(invalid)?;
    validate_id("node id", &id.node_id).map_err(invalid)?;
    validate_id("compute reference", &id.compute_reference).map_err(invalid)
}

#[async_trait]
impl<B: StorageBackend> JobStore for VersionedJobStore<B> {
    async fn create_job(&self, job: Job) -> Result<()> {
        validate_id("job id", &job.id).map_err(invalid)?;
        if self.backend.load_job(&job.id).await?.is_some() {
            return Err(JobStoreError::JobAlreadyExists(job.id));
        }

        let now = now();
        let timeout_at = job
            .timeout()
            .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
            .and_then(|timeout| now.checked_add_signed(timeout));
        let state = JobState::new(job.id.clone(), now, timeout_at);
        let history = HistoryEntry {
            job_id: job.id.clone(),
            event: HistoryEvent::Job {
                previous: None,
                new: state.state,
            },
            new_version: state.version,
            comment: "job created".to_string(),
            time: now,
        };

        let job_id = job.id.clone();
        match self
            .backend
            .commit(Commit::CreateJob {
                job,
                state,
                history,
            })
            .await?
        {
            CommitOutcome::Committed => {
                info!(job_id = %job_id, "Created job");
                Ok(())
            }
            CommitOutcome::Conflict => Err(JobStoreError::JobAlreadyExists(job_id)),
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let job_id = self.resolve_job_id(job_id).await?;
        self.backend
            .load_job(&job_id)
            .await?
            .ok_or(JobStoreError::JobNotFound(job_id))
    }

    async fn get_job_state(&self, job_id: &str) -> Result<JobState> {
        let job_id = self.resolve_job_id(job_id).await?;
        self.latest_job_state(&job_id).await
    }

    async fn get_jobs(&self, query: &JobQuery) -> Result<Vec<Job>> {
        let jobs = self.backend.list_jobs().await?;
        Ok(query.apply(jobs))
    }

    async fn get_in_progress_jobs(&self) -> Result<Vec<JobWithInfo>> {
        let mut jobs = self.backend.list_jobs().await?;
        jobs.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut in_progress = Vec::new();
        for job in jobs {
            let state = self.latest_job_state(&job.id).await?;
            if state.state.is_terminal() {
                continue;
            }
            let executions = self.backend.latest_execution_states(&job.id).await?;
            let history = self.backend.history(&job.id).await?;
            in_progress.push(JobWithInfo {
                job,
                state,
                executions,
                history,
            });
        }
        Ok(in_progress)
    }

    async fn get_executions(&self, job_id: &str) -> Result<Vec<ExecutionState>> {
        let job_id = self.resolve_job_id(job_id).await?;
        self.backend.latest_execution_states(&job_id).await
    }

    async fn get_execution(&self, execution_id: &ExecutionId) -> Result<ExecutionState> {
        validate_execution_id(execution_id)?;
        self.backend
            .latest_execution_state(execution_id)
            .await?
            .ok_or_else(|| JobStoreError::ExecutionNotFound(execution_id.clone()))
    }

    async fn get_job_history(
        &self,
        job_id: &str,
        filter: &JobHistoryFilter,
    ) -> Result<Vec<HistoryEntry>> {
        let job_id = self.resolve_job_id(job_id).await?;
        let entries = self.backend.history(&job_id).await?;
        Ok(filter_history(entries, filter))
    }

    async fn update_job_state(&self, request: UpdateJobStateRequest) -> Result<JobState> {
        validate_id("job id", &request.job_id).map_err(invalid)?;
        let current = self.latest_job_state(&request.job_id).await?;

        if current.state.is_terminal() {
            return Err(JobStoreError::JobAlreadyTerminal {
                job_id: request.job_id,
                current: current.state,
                attempted: request.new_state,
            });
        }
        request
            .condition
            .check(current.state, current.version)
            .map_err(|mismatch| JobStoreError::ConditionMismatch {
                aggregate: request.job_id.clone(),
                mismatch,
            })?;
        if !current.state.can_transition_to(request.new_state) {
            debug!(
                job_id = %request.job_id,
                from = %current.state,
                to = %request.new_state,
                "Job transition is off the lifecycle graph"
            );
        }

        let now = now();
        let next = current.next(request.new_state, now);
        let history = HistoryEntry {
            job_id: request.job_id.clone(),
            event: HistoryEvent::Job {
                previous: Some(current.state),
                new: next.state,
            },
            new_version: next.version,
            comment: request.comment,
            time: now,
        };

        match self
            .backend
            .commit(Commit::JobState {
                state: next.clone(),
                history,
            })
            .await?
        {
            CommitOutcome::Committed => {
                debug!(
                    job_id = %request.job_id,
                    state = %next.state,
                    version = next.version,
                    "Updated job state"
                );
                Ok(next)
            }
            CommitOutcome::Conflict => Err(JobStoreError::ConditionMismatch {
                aggregate: request.job_id,
                mismatch: Mismatch::ConcurrentWrite {
                    version: next.version,
                },
            }),
        }
    }

    async fn create_execution(
        &self,
        execution_id: ExecutionId,
        initial_state: ExecutionStateType,
    ) -> Result<ExecutionState> {
        validate_execution_id(&execution_id)?;
        if self.backend.load_job(&execution_id.job_id).await?.is_none() {
            return Err(JobStoreError::JobNotFound(execution_id.job_id));
        }
        if self
            .backend
            .latest_execution_state(&execution_id)
            .await?
            .is_some()
        {
            return Err(JobStoreError::ExecutionAlreadyExists(execution_id));
        }

        let now = now();
        let state = ExecutionState::new(execution_id.clone(), initial_state, now);
        let history = HistoryEntry {
            job_id: execution_id.job_id.clone(),
            event: HistoryEvent::Execution {
                execution_id: execution_id.clone(),
                previous: None,
                new: initial_state,
            },
            new_version: state.version,
            comment: "execution created".to_string(),
            time: now,
        };

        match self
            .backend
            .commit(Commit::Execution {
                state: state.clone(),
                history,
            })
            .await?
        {
            CommitOutcome::Committed => {
                info!(execution_id = %execution_id, state = %initial_state, "Created execution");
                Ok(state)
            }
            CommitOutcome::Conflict => Err(JobStoreError::ExecutionAlreadyExists(execution_id)),
        }
    }

    async fn update_execution(&self, request: UpdateExecutionRequest) -> Result<ExecutionState> {
        validate_execution_id(&request.execution_id)?;
        let current = self
            .backend
            .latest_execution_state(&request.execution_id)
            .await?
            .ok_or_else(|| JobStoreError::ExecutionNotFound(request.execution_id.clone()))?;

        let attempted = request.update.state.unwrap_or(current.state);
        if current.state.is_terminal() {
            return Err(JobStoreError::ExecutionAlreadyTerminal {
                execution_id: request.execution_id,
                current: current.state,
                attempted,
            });
        }
        request
            .condition
            .check(current.state, current.version)
            .map_err(|mismatch| JobStoreError::ConditionMismatch {
                aggregate: request.execution_id.to_string(),
                mismatch,
            })?;
        if attempted != current.state && !current.state.can_transition_to(attempted) {
            debug!(
                execution_id = %request.execution_id,
                from = %current.state,
                to = %attempted,
                "Execution transition is off the lifecycle graph"
            );
        }

        let now = now();
        let next = current.apply(&request.update, now);
        let history = HistoryEntry {
            job_id: request.execution_id.job_id.clone(),
            event: HistoryEvent::Execution {
                execution_id: request.execution_id.clone(),
                previous: Some(current.state),
                new: next.state,
            },
            new_version: next.version,
            comment: request.comment,
            time: now,
        };

        match self
            .backend
            .commit(Commit::Execution {
                state: next.clone(),
                history,
            })
            .await?
        {
            CommitOutcome::Committed => {
                debug!(
                    execution_id = %request.execution_id,
                    state = %next.state,
                    version = next.version,
                    "Updated execution"
                );
                Ok(next)
            }
            CommitOutcome::Conflict => Err(JobStoreError::ConditionMismatch {
                aggregate: request.execution_id.to_string(),
                mismatch: Mismatch::ConcurrentWrite {
                    version: next.version,
                },
            }),
        }
    }
}
