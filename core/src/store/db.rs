//! LMDB backend for the state store.
//!
//! Three named databases:
//!   history: timestamp_ms (big-endian u64) -> HistoryPoint
//!   workers: worker name -> WorkerRecord
//!   kv:      scalar state (mode, averages, fail count, snapshot blob)
//!
//! Values are stored as JSON documents rather than a binary encoding so that
//! adding fields stays forward compatible: old rows deserialize with serde
//! defaults, new rows are ignored gracefully by old readers.

use std::path::Path;

use heed::byteorder::BigEndian;
use heed::types::{SerdeJson, Str, U64};
use heed::{Database, Env, EnvOpenOptions};

use crate::types::{HistoryPoint, WorkerRecord};

const DEFAULT_MAP_SIZE_MB: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Engine(#[from] heed::Error),
    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct StoreDb {
    env: Env,
    history: Database<U64<BigEndian>, SerdeJson<HistoryPoint>>,
    workers: Database<Str, SerdeJson<WorkerRecord>>,
    kv: Database<Str, Str>,
}

impl StoreDb {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;

        let map_size_mb: usize = std::env::var("HASHPILOT_LMDB_MAP_SIZE_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAP_SIZE_MB);
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size_mb * 1024 * 1024)
                .max_dbs(3)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let history = env.create_database(&mut wtxn, Some("history"))?;
        let workers = env.create_database(&mut wtxn, Some("workers"))?;
        let kv = env.create_database(&mut wtxn, Some("kv"))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            history,
            workers,
            kv,
        })
    }

    /// Append one history point and drop everything older than `cutoff_ms`
    /// in the same write transaction.
    pub fn append_history(
        &self,
        point: &HistoryPoint,
        cutoff_ms: i64,
    ) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn()?;
        self.history
            .put(&mut wtxn, &(point.timestamp_ms.max(0) as u64), point)?;

        let cutoff = cutoff_ms.max(0) as u64;
        let stale: Vec<u64> = {
            let mut keys = Vec::new();
            let mut iter = self.history.range(&wtxn, &(..cutoff))?;
            while let Some(entry) = iter.next() {
                let (key, _) = entry?;
                keys.push(key);
            }
            keys
        };
        for key in &stale {
            self.history.delete(&mut wtxn, key)?;
        }

        wtxn.commit()?;
        Ok(())
    }

    /// Points newer than `cutoff_ms`, chronological, oldest first.
    pub fn load_history(&self, cutoff_ms: i64) -> Result<Vec<HistoryPoint>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut points = Vec::new();
        let mut iter = self.history.range(&rtxn, &(cutoff_ms.max(0) as u64..))?;
        while let Some(entry) = iter.next() {
            let (_, point) = entry?;
            points.push(point);
        }
        Ok(points)
    }

    /// Upsert the given workers and prune any whose last_seen predates
    /// `cutoff_ms`.
    pub fn upsert_workers(
        &self,
        workers: &[WorkerRecord],
        cutoff_ms: i64,
    ) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn()?;
        for worker in workers {
            self.workers.put(&mut wtxn, &worker.name, worker)?;
        }

        let stale: Vec<String> = {
            let mut names = Vec::new();
            let mut iter = self.workers.iter(&wtxn)?;
            while let Some(entry) = iter.next() {
                let (name, record) = entry?;
                if record.last_seen_ms < cutoff_ms {
                    names.push(name.to_string());
                }
            }
            names
        };
        for name in &stale {
            self.workers.delete(&mut wtxn, name)?;
        }

        wtxn.commit()?;
        Ok(())
    }

    pub fn load_workers(&self, cutoff_ms: i64) -> Result<Vec<WorkerRecord>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut records = Vec::new();
        let mut iter = self.workers.iter(&rtxn)?;
        while let Some(entry) = iter.next() {
            let (_, record) = entry?;
            if record.last_seen_ms >= cutoff_ms {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Write a batch of scalar fields in one transaction.
    pub fn put_kv_many(&self, pairs: &[(String, String)]) -> Result<(), StoreError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut wtxn = self.env.write_txn()?;
        for (key, value) in pairs {
            self.kv.put(&mut wtxn, key, value)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    pub fn get_kv(&self, key: &str) -> Result<Option<String>, StoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.kv.get(&rtxn, key)?.map(|v| v.to_string()))
    }

    /// All scalar fields under a key prefix (used to restore donation stats).
    pub fn load_kv_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut pairs = Vec::new();
        let mut iter = self.kv.iter(&rtxn)?;
        while let Some(entry) = iter.next() {
            let (key, value) = entry?;
            if key.starts_with(prefix) {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
        Ok(pairs)
    }
}
