//! Versioned job store for requester nodes.
//!
//! Jobs and executions are event-sourced aggregates: every accepted
//! transition appends a new immutable version together with one history
//! entry, and the current state is the highest version. Writers detect
//! races through optimistic [`UpdateCondition`]s instead of locks.
//!
//! The same [`VersionedJobStore`] runs over two interchangeable layouts:
//! key-value (in-memory or RocksDB) and relational (SQLite).

pub mod backend;
pub mod condition;
pub mod error;
pub mod history;
pub mod kv;
pub mod query;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use backend::{Commit, CommitOutcome, StorageBackend};
pub use condition::{UpdateCondition, UpdateExecutionRequest, UpdateJobStateRequest};
pub use error::{JobStoreError, Mismatch, Result};
pub use history::{filter_history, AuditTrail, JobHistoryFilter};
pub use kv::memory::MemoryKv;
pub use kv::{KeyValue, KvStorage};
pub use query::{JobQuery, JobSortBy};
pub use store::{JobStore, JobWithInfo, VersionedJobStore};

#[cfg(feature = "rocksdb")]
pub use kv::rocksdb::RocksKv;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

/// Store kept entirely in memory
pub type InMemoryJobStore = VersionedJobStore<KvStorage<MemoryKv>>;

#[cfg(feature = "rocksdb")]
pub type RocksDbJobStore = VersionedJobStore<KvStorage<RocksKv>>;

#[cfg(feature = "sqlite")]
pub type SqliteJobStore = VersionedJobStore<SqliteStorage>;

impl InMemoryJobStore {
    pub fn in_memory() -> Self {
        VersionedJobStore::new(KvStorage::new(MemoryKv::new()))
    }
}

#[cfg(feature = "rocksdb")]
impl RocksDbJobStore {
    /// Open a RocksDB-backed store in the directory `path`
    pub fn open_rocksdb(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(VersionedJobStore::new(KvStorage::new(RocksKv::open(path)?)))
    }
}

#[cfg(feature = "sqlite")]
impl SqliteJobStore {
    /// Open a SQLite-backed store in the file `path`
    pub fn open_sqlite(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(VersionedJobStore::new(SqliteStorage::open(path)?))
    }
}
