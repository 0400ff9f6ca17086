use super::KeyValue;
use crate::error::{JobStoreError, Result};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::info;

/// RocksDB engine. Commits are applied as one `WriteBatch`.
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    /// Open a database at `path`, creating it if it doesn't exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        info!(path = %path.display(), "Opened RocksDB job store");
        Ok(Self { db })
    }
}

impl KeyValue for RocksKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| JobStoreError::Storage(format!("non-UTF-8 key in store: {}", e)))?;
            out.push((key, value.to_vec()));
        }
        Ok(out)
    }

    fn write_batch(&self, puts: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in puts {
            batch.put(key.as_bytes(), value);
        }
        self.db.write(batch)?;
        Ok(())
    }
}
