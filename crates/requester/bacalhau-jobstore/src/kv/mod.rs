//! Key-value layout of the store.
//!
//! ```text
//! jobs/<job>                                    Job
//! jobstate/<job>/<version>                      JobState
//! execstate/<job>/<node>/<reference>/<version>  ExecutionState
//! history/<job>/<micros>/<seq>                  HistoryEntry
//! meta/history_seq                              last history sequence number
//! ```
//!
//! Numbers are zero-padded so lexicographic key order is numeric order.
//! IDs never contain `/`, so every `<prefix>/` scan is exact.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

use crate::backend::{Commit, CommitOutcome, StorageBackend};
use crate::error::{JobStoreError, Result};
use async_trait::async_trait;
use bacalhau_types::{ExecutionId, ExecutionState, HistoryEntry, Job, JobState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};

const JOBS: &str = "jobs";
const JOB_STATES: &str = "jobstate";
const EXECUTION_STATES: &str = "execstate";
const HISTORY: &str = "history";
const HISTORY_SEQ: &str = "meta/history_seq";

/// Minimal ordered key-value engine
pub trait KeyValue: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Write every pair atomically
    fn write_batch(&self, puts: Vec<(String, Vec<u8>)>) -> Result<()>;
}

fn job_key(job_id: &str) -> String {
    format!("{}/{}", JOBS, job_id)
}

fn job_state_prefix(job_id: &str) -> String {
    format!("{}/{}/", JOB_STATES, job_id)
}

fn job_state_key(job_id: &str, version: u64) -> String {
    format!("{}{:020}", job_state_prefix(job_id), version)
}

fn job_executions_prefix(job_id: &str) -> String {
    format!("{}/{}/", EXECUTION_STATES, job_id)
}

fn execution_prefix(id: &ExecutionId) -> String {
    format!(
        "{}{}/{}/",
        job_executions_prefix(&id.job_id),
        id.node_id,
        id.compute_reference
    )
}

fn execution_key(id: &ExecutionId, version: u64) -> String {
    format!("{}{:020}", execution_prefix(id), version)
}

fn history_prefix(job_id: &str) -> String {
    format!("{}/{}/", HISTORY, job_id)
}

fn history_key(entry: &HistoryEntry, seq: u64) -> String {
    let micros = entry.time.timestamp_micros().max(0);
    format!("{}{:020}/{:020}", history_prefix(&entry.job_id), micros, seq)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn decode_all<T: DeserializeOwned>(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<T>> {
    entries.iter().map(|(_, value)| decode(value)).collect()
}

/// Last value of a version-ordered scan
fn decode_latest<T: DeserializeOwned>(entries: Vec<(String, Vec<u8>)>) -> Result<Option<T>> {
    entries
        .last()
        .map(|(_, value)| decode(value))
        .transpose()
}

/// [`StorageBackend`] over any [`KeyValue`] engine
pub struct KvStorage<K: KeyValue> {
    kv: Arc<K>,
    /// Serializes the check-then-write of commits
    commit_lock: Arc<Mutex<()>>,
}

impl<K: KeyValue> Clone for KvStorage<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            commit_lock: self.commit_lock.clone(),
        }
    }
}

impl<K: KeyValue> KvStorage<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv: Arc::new(kv),
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn engine(&self) -> &K {
        &self.kv
    }

    /// Run blocking engine work off the async executor
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&K) -> Result<T> + Send + 'static,
    {
        let kv = self.kv.clone();
        tokio::task::spawn_blocking(move || f(kv.as_ref())).await?
    }

    fn apply_commit(kv: &K, lock: &Mutex<()>, commit: Commit) -> Result<CommitOutcome> {
        let _guard = lock
            .lock()
            .map_err(|e| JobStoreError::Storage(format!("commit lock poisoned: {}", e)))?;

        let (guard_key, mut puts, history) = match commit {
            Commit::CreateJob {
                job,
                state,
                history,
            } => (
                job_key(&job.id),
                vec![
                    (job_key(&job.id), encode(&job)?),
                    (job_state_key(&state.job_id, state.version), encode(&state)?),
                ],
                history,
            ),
            Commit::JobState { state, history } => {
                let key = job_state_key(&state.job_id, state.version);
                (key.clone(), vec![(key, encode(&state)?)], history)
            }
            Commit::Execution { state, history } => {
                let key = execution_key(&state.id, state.version);
                (key.clone(), vec![(key, encode(&state)?)], history)
            }
        };

        if kv.get(&guard_key)?.is_some() {
            return Ok(CommitOutcome::Conflict);
        }

        let last_seq: u64 = match kv.get(HISTORY_SEQ)? {
            Some(bytes) => decode(&bytes)?,
            None => 0,
        };
        let seq = last_seq + 1;
        puts.push((history_key(&history, seq), encode(&history)?));
        puts.push((HISTORY_SEQ.to_string(), encode(&seq)?));

        kv.write_batch(puts)?;
        Ok(CommitOutcome::Committed)
    }
}

#[async_trait]
impl<K: KeyValue> StorageBackend for KvStorage<K> {
    async fn load_job(&self, job_id: &str) -> Result<Option<Job>> {
        let key = job_key(job_id);
        self.blocking(move |kv| kv.get(&key)?.map(|bytes| decode(&bytes)).transpose())
            .await
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.blocking(|kv| decode_all(kv.scan_prefix(&format!("{}/", JOBS))?))
            .await
    }

    async fn list_job_ids(&self) -> Result<Vec<String>> {
        self.blocking(|kv| {
            let prefix = format!("{}/", JOBS);
            Ok(kv
                .scan_prefix(&prefix)?
                .into_iter()
                .filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
                .collect())
        })
        .await
    }

    async fn latest_job_state(&self, job_id: &str) -> Result<Option<JobState>> {
        let prefix = job_state_prefix(job_id);
        self.blocking(move |kv| decode_latest(kv.scan_prefix(&prefix)?))
            .await
    }

    async fn latest_execution_states(&self, job_id: &str) -> Result<Vec<ExecutionState>> {
        let prefix = job_executions_prefix(job_id);
        self.blocking(move |kv| {
            // Keys are ordered by execution, then version: keep the last
            // version of each execution
            let mut latest: Vec<ExecutionState> = Vec::new();
            for state in decode_all::<ExecutionState>(kv.scan_prefix(&prefix)?)? {
                match latest.last_mut() {
                    Some(last) if last.id == state.id => *last = state,
                    _ => latest.push(state),
                }
            }
            Ok(latest)
        })
        .await
    }

    async fn latest_execution_state(&self, id: &ExecutionId) -> Result<Option<ExecutionState>> {
        let prefix = execution_prefix(id);
        self.blocking(move |kv| decode_latest(kv.scan_prefix(&prefix)?))
            .await
    }

    async fn history(&self, job_id: &str) -> Result<Vec<HistoryEntry>> {
        let prefix = history_prefix(job_id);
        self.blocking(move |kv| decode_all(kv.scan_prefix(&prefix)?))
            .await
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
        let lock = self.commit_lock.clone();
        self.blocking(move |kv| Self::apply_commit(kv, &lock, commit))
            .await
    }
}
