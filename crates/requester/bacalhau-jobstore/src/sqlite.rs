//! Relational layout of the store.
//!
//! Every state table is keyed by `(aggregate id…, version)`, so appending an
//! already existing version violates the primary key and nothing is
//! written. History rows get an autoincrement `seq` recording commit order.

use crate::backend::{Commit, CommitOutcome, StorageBackend};
use crate::error::{JobStoreError, Result};
use async_trait::async_trait;
use bacalhau_types::{
    ExecutionId, ExecutionState, ExecutionStateType, HistoryEntry, HistoryEvent, Job, JobState,
    JobStateType,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id          TEXT PRIMARY KEY,
    client_id   TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    job         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_states (
    job_id      TEXT NOT NULL REFERENCES jobs(id),
    version     INTEGER NOT NULL,
    state       TEXT NOT NULL,
    create_time INTEGER NOT NULL,
    update_time INTEGER NOT NULL,
    timeout_at  INTEGER,
    PRIMARY KEY (job_id, version)
);

CREATE TABLE IF NOT EXISTS execution_states (
    job_id               TEXT NOT NULL REFERENCES jobs(id),
    node_id              TEXT NOT NULL,
    compute_reference    TEXT NOT NULL,
    version              INTEGER NOT NULL,
    state                TEXT NOT NULL,
    accepted_ask_for_bid INTEGER NOT NULL,
    run_output           TEXT,
    published_result     TEXT,
    verification_result  TEXT,
    create_time          INTEGER NOT NULL,
    update_time          INTEGER NOT NULL,
    PRIMARY KEY (job_id, node_id, compute_reference, version)
);

CREATE TABLE IF NOT EXISTS history (
    seq               INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id            TEXT NOT NULL REFERENCES jobs(id),
    node_id           TEXT,
    compute_reference TEXT,
    previous_state    TEXT,
    new_state         TEXT NOT NULL,
    new_version       INTEGER NOT NULL,
    comment           TEXT NOT NULL,
    time              INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS history_by_job ON history (job_id, time, seq);
"#;

/// SQLite-backed [`StorageBackend`]
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let storage = Self::from_connection(conn)?;
        info!(path = %path.as_ref().display(), "Opened SQLite job store");
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking database work off the async executor
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| JobStoreError::Storage(format!("connection lock poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await?
    }
}

fn to_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| JobStoreError::Storage(format!("timestamp out of range: {}", micros)))
}

fn parse_state<S: std::str::FromStr>(raw: &str) -> Result<S>
where
    S::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: S::Err| JobStoreError::Storage(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(JobStoreError::from)
}

fn from_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(JobStoreError::from)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Columns of `job_states`, read by [`job_state_from_row`]
const JOB_STATE_COLUMNS: &str = "job_id, version, state, create_time, update_time, timeout_at";

type JobStateRow = (String, i64, String, i64, i64, Option<i64>);

fn job_state_from_row(row: &Row<'_>) -> rusqlite::Result<JobStateRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_job_state(raw: (String, i64, String, i64, i64, Option<i64>)) -> Result<JobState> {
    let (job_id, version, state, create_time, update_time, timeout_at) = raw;
    Ok(JobState {
        job_id,
        state: parse_state::<JobStateType>(&state)?,
        version: version as u64,
        create_time: from_micros(create_time)?,
        update_time: from_micros(update_time)?,
        timeout_at: timeout_at.map(from_micros).transpose()?,
    })
}

const EXECUTION_COLUMNS: &str = "job_id, node_id, compute_reference, version, state, \
     accepted_ask_for_bid, run_output, published_result, verification_result, \
     create_time, update_time";

struct ExecutionRow {
    job_id: String,
    node_id: String,
    compute_reference: String,
    version: i64,
    state: String,
    accepted_ask_for_bid: bool,
    run_output: Option<String>,
    published_result: Option<String>,
    verification_result: Option<String>,
    create_time: i64,
    update_time: i64,
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        job_id: row.get(0)?,
        node_id: row.get(1)?,
        compute_reference: row.get(2)?,
        version: row.get(3)?,
        state: row.get(4)?,
        accepted_ask_for_bid: row.get(5)?,
        run_output: row.get(6)?,
        published_result: row.get(7)?,
        verification_result: row.get(8)?,
        create_time: row.get(9)?,
        update_time: row.get(10)?,
    })
}

impl ExecutionRow {
    fn into_state(self) -> Result<ExecutionState> {
        Ok(ExecutionState {
            id: ExecutionId::new(self.job_id, self.node_id, self.compute_reference),
            state: parse_state::<ExecutionStateType>(&self.state)?,
            version: self.version as u64,
            accepted_ask_for_bid: self.accepted_ask_for_bid,
            run_output: from_json(self.run_output)?,
            published_result: self.published_result,
            verification_result: from_json(self.verification_result)?,
            create_time: from_micros(self.create_time)?,
            update_time: from_micros(self.update_time)?,
        })
    }
}

struct HistoryRow {
    job_id: String,
    node_id: Option<String>,
    compute_reference: Option<String>,
    previous_state: Option<String>,
    new_state: String,
    new_version: i64,
    comment: String,
    time: i64,
}

impl HistoryRow {
    fn into_entry(self) -> Result<HistoryEntry> {
        let event = match (self.node_id, self.compute_reference) {
            (Some(node_id), Some(compute_reference)) => HistoryEvent::Execution {
                execution_id: ExecutionId::new(self.job_id.clone(), node_id, compute_reference),
                previous: self
                    .previous_state
                    .as_deref()
                    .map(parse_state::<ExecutionStateType>)
                    .transpose()?,
                new: parse_state(&self.new_state)?,
            },
            _ => HistoryEvent::Job {
                previous: self
                    .previous_state
                    .as_deref()
                    .map(parse_state::<JobStateType>)
                    .transpose()?,
                new: parse_state(&self.new_state)?,
            },
        };
        Ok(HistoryEntry {
            job_id: self.job_id,
            event,
            new_version: self.new_version as u64,
            comment: self.comment,
            time: from_micros(self.time)?,
        })
    }
}

fn insert_job_state(tx: &Transaction<'_>, state: &JobState) -> rusqlite::Result<usize> {
    tx.execute(
        "INSERT INTO job_states (job_id, version, state, create_time, update_time, timeout_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            state.job_id,
            state.version as i64,
            state.state.as_str(),
            to_micros(state.create_time),
            to_micros(state.update_time),
            state.timeout_at.map(to_micros),
        ],
    )
}

fn insert_execution_state(
    tx: &Transaction<'_>,
    state: &ExecutionState,
    run_output: Option<String>,
    verification_result: Option<String>,
) -> rusqlite::Result<usize> {
    tx.execute(
        "INSERT INTO execution_states (job_id, node_id, compute_reference, version, state, \
         accepted_ask_for_bid, run_output, published_result, verification_result, \
         create_time, update_time) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            state.id.job_id,
            state.id.node_id,
            state.id.compute_reference,
            state.version as i64,
            state.state.as_str(),
            state.accepted_ask_for_bid,
            run_output,
            state.published_result,
            verification_result,
            to_micros(state.create_time),
            to_micros(state.update_time),
        ],
    )
}

fn insert_history(tx: &Transaction<'_>, entry: &HistoryEntry) -> rusqlite::Result<usize> {
    let (node_id, compute_reference, previous, new) = match &entry.event {
        HistoryEvent::Job { previous, new } => {
            (None, None, previous.map(|s| s.as_str()), new.as_str())
        }
        HistoryEvent::Execution {
            execution_id,
            previous,
            new,
        } => (
            Some(execution_id.node_id.as_str()),
            Some(execution_id.compute_reference.as_str()),
            previous.map(|s| s.as_str()),
            new.as_str(),
        ),
    };
    tx.execute(
        "INSERT INTO history (job_id, node_id, compute_reference, previous_state, new_state, \
         new_version, comment, time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.job_id,
            node_id,
            compute_reference,
            previous,
            new,
            entry.new_version as i64,
            entry.comment,
            to_micros(entry.time),
        ],
    )
}

fn apply_commit(conn: &mut Connection, commit: Commit) -> Result<CommitOutcome> {
    let tx = conn.transaction()?;

    let appended = match &commit {
        Commit::CreateJob { job, state, .. } => tx
            .execute(
                "INSERT INTO jobs (id, client_id, created_at, job) VALUES (?1, ?2, ?3, ?4)",
                params![
                    job.id,
                    job.metadata.client_id,
                    to_micros(job.metadata.created_at),
                    serde_json::to_string(job)?,
                ],
            )
            .and_then(|_| insert_job_state(&tx, state)),
        Commit::JobState { state, .. } => insert_job_state(&tx, state),
        Commit::Execution { state, .. } => {
            let run_output = to_json(&state.run_output)?;
            let verification_result = to_json(&state.verification_result)?;
            insert_execution_state(&tx, state, run_output, verification_result)
        }
    };

    // Dropping `tx` on conflict rolls back
    match appended {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => return Ok(CommitOutcome::Conflict),
        Err(e) => return Err(e.into()),
    }

    let history = match &commit {
        Commit::CreateJob { history, .. }
        | Commit::JobState { history, .. }
        | Commit::Execution { history, .. } => history,
    };
    insert_history(&tx, history)?;
    tx.commit()?;
    Ok(CommitOutcome::Committed)
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn load_job(&self, job_id: &str) -> Result<Option<Job>> {
        let job_id = job_id.to_string();
        self.blocking(move |conn| {
            let raw: Option<String> = conn
                .query_row("SELECT job FROM jobs WHERE id = ?1", params![job_id], |row| {
                    row.get(0)
                })
                .optional()?;
            raw.map(|raw| serde_json::from_str(&raw).map_err(JobStoreError::from))
                .transpose()
        })
        .await
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT job FROM jobs ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut jobs = Vec::new();
            for raw in rows {
                jobs.push(serde_json::from_str(&raw?)?);
            }
            Ok(jobs)
        })
        .await
    }

    async fn list_job_ids(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM jobs ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn latest_job_state(&self, job_id: &str) -> Result<Option<JobState>> {
        let job_id = job_id.to_string();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM job_states WHERE job_id = ?1 ORDER BY version DESC LIMIT 1",
                JOB_STATE_COLUMNS
            );
            conn.query_row(&sql, params![job_id], job_state_from_row)
                .optional()?
                .map(build_job_state)
                .transpose()
        })
        .await
    }

    async fn latest_execution_states(&self, job_id: &str) -> Result<Vec<ExecutionState>> {
        let job_id = job_id.to_string();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {cols} FROM execution_states e WHERE job_id = ?1 AND version = ( \
                     SELECT MAX(version) FROM execution_states l \
                     WHERE l.job_id = e.job_id AND l.node_id = e.node_id \
                     AND l.compute_reference = e.compute_reference) \
                 ORDER BY node_id, compute_reference",
                cols = EXECUTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![job_id], execution_from_row)?;
            let mut states = Vec::new();
            for row in rows {
                states.push(row?.into_state()?);
            }
            Ok(states)
        })
        .await
    }

    async fn latest_execution_state(&self, id: &ExecutionId) -> Result<Option<ExecutionState>> {
        let id = id.clone();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM execution_states \
                 WHERE job_id = ?1 AND node_id = ?2 AND compute_reference = ?3 \
                 ORDER BY version DESC LIMIT 1",
                EXECUTION_COLUMNS
            );
            conn.query_row(
                &sql,
                params![id.job_id, id.node_id, id.compute_reference],
                execution_from_row,
            )
            .optional()?
            .map(ExecutionRow::into_state)
            .transpose()
        })
        .await
    }

    async fn history(&self, job_id: &str) -> Result<Vec<HistoryEntry>> {
        let job_id = job_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, node_id, compute_reference, previous_state, new_state, \
                 new_version, comment, time FROM history WHERE job_id = ?1 ORDER BY time, seq",
            )?;
            let rows = stmt.query_map(params![job_id], |row| {
                Ok(HistoryRow {
                    job_id: row.get(0)?,
                    node_id: row.get(1)?,
                    compute_reference: row.get(2)?,
                    previous_state: row.get(3)?,
                    new_state: row.get(4)?,
                    new_version: row.get(5)?,
                    comment: row.get(6)?,
                    time: row.get(7)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?.into_entry()?);
            }
            Ok(entries)
        })
        .await
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
        self.blocking(move |conn| apply_commit(conn, commit)).await
    }
}
