//! Durable state store.
//!
//! Canonical mutable process state lives in memory behind one coarse lock;
//! every mutation is mirrored to the LMDB backend before the call returns.
//! Storage failures degrade durability but never stop the controller: the
//! in-memory copy stays authoritative and the error is logged.
//!
//! All reads hand out copies, so callers can never observe or cause a
//! mutation outside the critical section.

mod db;

pub use db::StoreError;

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::tiers::TierTable;
use crate::types::{DonationStats, HistoryPoint, Mode, StatsPatch, WorkerRecord};
use db::StoreDb;

const KV_MODE: &str = "xvb_current_mode";
const KV_MODE_LABEL: &str = "xvb_mode_label";
const KV_AVG_1H: &str = "xvb_1h_avg";
const KV_AVG_24H: &str = "xvb_24h_avg";
const KV_FAIL_COUNT: &str = "xvb_fail_count";
const KV_LAST_UPDATE: &str = "xvb_last_update_ms";
const KV_TOTAL_DONATED: &str = "xvb_total_donated_ms";
const KV_SNAPSHOT: &str = "snapshot_latest";
const KV_SCHEMA_VERSION: &str = "schema_version";

const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub history_retention: Duration,
    pub worker_retention: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            history_retention: Duration::from_secs(2 * 24 * 3600),
            worker_retention: Duration::from_secs(3 * 24 * 3600),
        }
    }
}

struct MemState {
    history: VecDeque<HistoryPoint>,
    workers: HashMap<String, WorkerRecord>,
    stats: DonationStats,
    tiers: TierTable,
}

struct StoreInner {
    mem: Mutex<MemState>,
    /// The storage engine is not assumed safe for concurrent writers; every
    /// backend access is serialized through this lock.
    db_lock: Mutex<StoreDb>,
    opts: StoreOptions,
}

/// Handle to the shared state store. Cheap to clone; all clones share the
/// same state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl StateStore {
    /// Open the store and restore persisted state. This is the only fatal
    /// path: a store that cannot open at all terminates startup.
    pub fn open(path: &Path, opts: StoreOptions) -> Result<Self, StoreError> {
        let db = StoreDb::open(path)?;
        let now = now_ms();

        let history_cutoff = now - opts.history_retention.as_millis() as i64;
        let worker_cutoff = now - opts.worker_retention.as_millis() as i64;

        let history: VecDeque<HistoryPoint> = db.load_history(history_cutoff)?.into();
        let workers: HashMap<String, WorkerRecord> = db
            .load_workers(worker_cutoff)?
            .into_iter()
            .map(|w| (w.name.clone(), w))
            .collect();

        let mut stats = DonationStats::default();
        for (key, value) in db.load_kv_prefix("xvb_")? {
            // Enforce the schema: keys we do not know are ignored, corrupt
            // values are skipped rather than poisoning the whole load.
            match key.as_str() {
                KV_MODE => {
                    if let Some(mode) = Mode::parse_label(&value) {
                        stats.current_mode = mode;
                    }
                }
                KV_MODE_LABEL => stats.mode_label = value,
                KV_AVG_1H => {
                    if let Ok(v) = value.parse() {
                        stats.avg_1h = v;
                    }
                }
                KV_AVG_24H => {
                    if let Ok(v) = value.parse() {
                        stats.avg_24h = v;
                    }
                }
                KV_FAIL_COUNT => {
                    if let Ok(v) = value.parse() {
                        stats.fail_count = v;
                    }
                }
                KV_LAST_UPDATE => {
                    if let Ok(v) = value.parse() {
                        stats.last_update_ms = v;
                    }
                }
                KV_TOTAL_DONATED => {
                    if let Ok(v) = value.parse() {
                        stats.total_donated_ms = v;
                    }
                }
                other => warn!(key = other, "ignoring unknown persisted field"),
            }
        }

        if let Err(e) = db.put_kv_many(&[(KV_SCHEMA_VERSION.to_string(), SCHEMA_VERSION.to_string())])
        {
            warn!(error = %e, "could not stamp schema version");
        }

        info!(
            history_points = history.len(),
            workers = workers.len(),
            mode = %stats.current_mode,
            "state restored"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                mem: Mutex::new(MemState {
                    history,
                    workers,
                    stats,
                    tiers: TierTable::defaults(),
                }),
                db_lock: Mutex::new(db),
                opts,
            }),
        })
    }

    // ── Reads (copies, memory fast path) ──

    pub fn donation_stats(&self) -> DonationStats {
        self.inner.mem.lock().stats.clone()
    }

    /// Chronological history, oldest first.
    pub fn history(&self) -> Vec<HistoryPoint> {
        self.inner.mem.lock().history.iter().cloned().collect()
    }

    pub fn known_workers(&self) -> Vec<WorkerRecord> {
        let mut workers: Vec<WorkerRecord> =
            self.inner.mem.lock().workers.values().cloned().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        workers
    }

    pub fn tiers(&self) -> TierTable {
        self.inner.mem.lock().tiers.clone()
    }

    pub fn set_tiers(&self, tiers: TierTable) {
        self.inner.mem.lock().tiers = tiers;
    }

    // ── Mutations ──
    //
    // Each has a blocking form (directly testable, usable from blocking
    // contexts) and an async form that offloads the storage-engine call so
    // the control and telemetry tasks never stall on synchronous disk I/O.

    pub fn apply_stats_patch_blocking(&self, patch: &StatsPatch) {
        self.inner.apply_stats_patch_at(patch, now_ms());
    }

    pub async fn apply_stats_patch(&self, patch: StatsPatch) {
        let inner = self.inner.clone();
        let ts = now_ms();
        offload(move || inner.apply_stats_patch_at(&patch, ts)).await;
    }

    pub fn append_history_point_blocking(
        &self,
        timestamp_ms: i64,
        total_hr: f64,
        p2pool_hr: f64,
        xvb_hr: f64,
    ) {
        self.inner
            .append_history_point_at(timestamp_ms, total_hr, p2pool_hr, xvb_hr);
    }

    pub async fn append_history_point(&self, total_hr: f64, p2pool_hr: f64, xvb_hr: f64) {
        let inner = self.inner.clone();
        let ts = now_ms();
        offload(move || inner.append_history_point_at(ts, total_hr, p2pool_hr, xvb_hr)).await;
    }

    pub fn upsert_workers_blocking(&self, seen: &[(String, String)], timestamp_ms: i64) {
        self.inner.upsert_workers_at(seen, timestamp_ms);
    }

    pub async fn upsert_workers(&self, seen: Vec<(String, String)>) {
        let inner = self.inner.clone();
        let ts = now_ms();
        offload(move || inner.upsert_workers_at(&seen, ts)).await;
    }

    pub fn save_snapshot_blocking(&self, snapshot: &serde_json::Value) {
        self.inner.save_snapshot(snapshot);
    }

    /// Persist the aggregated application state blob for a warm dashboard
    /// on next boot. Purely a cold-start nicety.
    pub async fn save_snapshot(&self, snapshot: serde_json::Value) {
        let inner = self.inner.clone();
        offload(move || inner.save_snapshot(&snapshot)).await;
    }

    /// Read back the last snapshot blob. Called once at boot.
    pub fn load_snapshot(&self) -> Option<serde_json::Value> {
        let db = self.inner.db_lock.lock();
        match db.get_kv(KV_SNAPSHOT) {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map_err(|e| warn!(error = %e, "snapshot blob is corrupt"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not load snapshot");
                None
            }
        }
    }
}

async fn offload<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    if tokio::task::spawn_blocking(f).await.is_err() {
        warn!("store worker task aborted");
    }
}

impl StoreInner {
    fn apply_stats_patch_at(&self, patch: &StatsPatch, now_ms: i64) {
        if patch.is_empty() {
            return;
        }

        let mut dirty: Vec<(String, String)> = Vec::new();
        {
            let mut mem = self.mem.lock();
            let stats = &mut mem.stats;
            let mut numeric_changed = false;

            if let Some(mode) = patch.mode {
                if stats.current_mode != mode {
                    stats.current_mode = mode;
                    dirty.push((KV_MODE.to_string(), mode.as_str().to_string()));
                }
            }
            if let Some(label) = &patch.mode_label {
                if &stats.mode_label != label {
                    stats.mode_label = label.clone();
                    dirty.push((KV_MODE_LABEL.to_string(), label.clone()));
                }
            }
            if let Some(avg) = patch.avg_1h {
                if stats.avg_1h != avg {
                    stats.avg_1h = avg;
                    dirty.push((KV_AVG_1H.to_string(), avg.to_string()));
                    numeric_changed = true;
                }
            }
            if let Some(avg) = patch.avg_24h {
                if stats.avg_24h != avg {
                    stats.avg_24h = avg;
                    dirty.push((KV_AVG_24H.to_string(), avg.to_string()));
                    numeric_changed = true;
                }
            }
            if let Some(count) = patch.fail_count {
                if stats.fail_count != count {
                    stats.fail_count = count;
                    dirty.push((KV_FAIL_COUNT.to_string(), count.to_string()));
                    numeric_changed = true;
                }
            }
            if let Some(ms) = patch.add_donated_ms {
                if ms > 0 {
                    stats.total_donated_ms += ms;
                    dirty.push((
                        KV_TOTAL_DONATED.to_string(),
                        stats.total_donated_ms.to_string(),
                    ));
                }
            }

            if numeric_changed {
                stats.last_update_ms = now_ms;
                dirty.push((KV_LAST_UPDATE.to_string(), now_ms.to_string()));
            }
        }

        // Changed fields are persisted individually, not as a full rewrite.
        if !dirty.is_empty() {
            let db = self.db_lock.lock();
            if let Err(e) = db.put_kv_many(&dirty) {
                warn!(error = %e, "stats not persisted; continuing in memory");
            }
        }
    }

    fn append_history_point_at(
        &self,
        timestamp_ms: i64,
        total_hr: f64,
        p2pool_hr: f64,
        xvb_hr: f64,
    ) {
        let cutoff = timestamp_ms - self.opts.history_retention.as_millis() as i64;
        let point = HistoryPoint {
            timestamp_ms,
            total_hr,
            p2pool_hr,
            xvb_hr,
        };

        {
            let mut mem = self.mem.lock();
            mem.history.push_back(point.clone());
            while mem
                .history
                .front()
                .map(|p| p.timestamp_ms < cutoff)
                .unwrap_or(false)
            {
                mem.history.pop_front();
            }
        }

        let db = self.db_lock.lock();
        if let Err(e) = db.append_history(&point, cutoff) {
            warn!(error = %e, "history point not persisted; continuing in memory");
        }
    }

    fn upsert_workers_at(&self, seen: &[(String, String)], timestamp_ms: i64) {
        let cutoff = timestamp_ms - self.opts.worker_retention.as_millis() as i64;
        let mut records = Vec::with_capacity(seen.len());

        {
            let mut mem = self.mem.lock();
            for (name, ip) in seen {
                if name.is_empty() || ip.is_empty() {
                    continue;
                }
                let record = WorkerRecord {
                    name: name.clone(),
                    ip: ip.clone(),
                    last_seen_ms: timestamp_ms,
                };
                mem.workers.insert(name.clone(), record.clone());
                records.push(record);
            }
            mem.workers.retain(|_, w| w.last_seen_ms >= cutoff);
        }

        let db = self.db_lock.lock();
        if let Err(e) = db.upsert_workers(&records, cutoff) {
            warn!(error = %e, "worker registry not persisted; continuing in memory");
        }
    }

    fn save_snapshot(&self, snapshot: &serde_json::Value) {
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "snapshot not serializable");
                return;
            }
        };
        let db = self.db_lock.lock();
        if let Err(e) = db.put_kv_many(&[(KV_SNAPSHOT.to_string(), raw)]) {
            warn!(error = %e, "snapshot not persisted");
        }
    }
}
