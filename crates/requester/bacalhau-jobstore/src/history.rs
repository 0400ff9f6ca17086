//! Filtering and causal replay of job history.

use crate::error::{JobStoreError, Result};
use bacalhau_types::{ExecutionId, ExecutionStateType, HistoryEntry, HistoryEvent, JobStateType};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Which history entries of a job to return
#[derive(Debug, Clone, Default)]
pub struct JobHistoryFilter {
    /// Only entries at or after this time
    pub since: Option<DateTime<Utc>>,

    pub exclude_job_level: bool,

    pub exclude_execution_level: bool,

    /// Only execution-level entries of this execution
    pub execution_id: Option<ExecutionId>,
}

impl JobHistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(since) = self.since {
            if entry.time < since {
                return false;
            }
        }
        match &entry.event {
            HistoryEvent::Job { .. } => !self.exclude_job_level,
            HistoryEvent::Execution { execution_id, .. } => {
                if self.exclude_execution_level {
                    return false;
                }
                match &self.execution_id {
                    Some(wanted) => wanted == execution_id,
                    None => true,
                }
            }
        }
    }
}

/// Keep the entries matching `filter`. Entries arrive in display order
/// (time, then commit order) and keep it.
pub fn filter_history(entries: Vec<HistoryEntry>, filter: &JobHistoryFilter) -> Vec<HistoryEntry> {
    entries
        .into_iter()
        .filter(|entry| filter.matches(entry))
        .collect()
}

/// State of a job reconstructed from its history alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTrail {
    /// Latest job state and its version
    pub job: Option<(JobStateType, u64)>,

    /// Latest state and version of every execution
    pub executions: BTreeMap<ExecutionId, (ExecutionStateType, u64)>,
}

impl AuditTrail {
    /// Replay `entries` in causal order, i.e. sorted by aggregate and then
    /// version, ignoring wall-clock time. Every aggregate must run
    /// `1, 2, 3…` without gaps or repeats.
    pub fn replay(entries: &[HistoryEntry]) -> Result<AuditTrail> {
        let mut by_aggregate: BTreeMap<String, Vec<&HistoryEntry>> = BTreeMap::new();
        for entry in entries {
            by_aggregate
                .entry(entry.aggregate_key())
                .or_default()
                .push(entry);
        }

        let mut trail = AuditTrail::default();
        for (aggregate, mut versions) in by_aggregate {
            versions.sort_by_key(|entry| entry.new_version);
            for (expected, entry) in (1u64..).zip(versions.iter()) {
                if entry.new_version != expected {
                    return Err(JobStoreError::HistoryGap {
                        aggregate,
                        expected,
                        found: entry.new_version,
                    });
                }
                match &entry.event {
                    HistoryEvent::Job { new, .. } => {
                        trail.job = Some((*new, entry.new_version));
                    }
                    HistoryEvent::Execution {
                        execution_id, new, ..
                    } => {
                        trail
                            .executions
                            .insert(execution_id.clone(), (*new, entry.new_version));
                    }
                }
            }
        }
        Ok(trail)
    }
}
