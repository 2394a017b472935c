//! Telemetry collection task.
//!
//! Aggregates the proxy roster, per-worker stats and the local snapshot
//! files into one `LatestData` view, persists the historical series and the
//! warm-boot snapshot, and periodically syncs the donation-performance
//! service. The control task consumes `LatestData` through a watch channel
//! and is never blocked by anything this task does.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use hashpilot_core::{Mode, ShareRecord, StateStore, StatsPatch};

use crate::client::{BonusClient, ProxyClient, WorkerClient};
use crate::collector::{
    self, LocalPoolStats, NetworkStats, P2pStats, StratumWorker,
};
use crate::config::Config;
use crate::util::format_hashrate;

/// Shares kept in the tracking ring before the oldest are dropped.
const SHARES_CAP: usize = 10_000;
/// Shares carried into the persisted snapshot blob.
const SNAPSHOT_SHARES: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub name: String,
    pub ip: String,
    /// Whether the worker's own API answered this tick. Offline workers are
    /// excluded from fleet totals but stay on the roster for switching.
    pub online: bool,
    pub h10: f64,
    pub h60: f64,
    pub h15: f64,
    pub uptime_secs: u64,
}

/// One completed telemetry tick, as consumed by the control loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestData {
    pub timestamp_ms: i64,
    pub workers: Vec<WorkerSnapshot>,
    /// Short-window fleet total (H/s).
    pub current_hr: f64,
    /// 15-minute fleet total (H/s).
    pub stable_hr: f64,
    pub pool: LocalPoolStats,
    pub network: NetworkStats,
    pub p2p: P2pStats,
    pub shares: Vec<ShareRecord>,
}

#[derive(Default)]
struct LocalFiles {
    p2p: P2pStats,
    pool: LocalPoolStats,
    network: NetworkStats,
    stratum: Vec<StratumWorker>,
}

pub struct TelemetryTask {
    cfg: Arc<Config>,
    store: StateStore,
    proxy: ProxyClient,
    workers: WorkerClient,
    bonus: BonusClient,
    tx: watch::Sender<LatestData>,
    latest: LatestData,
}

impl TelemetryTask {
    /// Build the task and its output channel. The channel is pre-seeded
    /// from the persisted snapshot so a restart presents warm data before
    /// the first fresh tick completes.
    pub fn new(
        cfg: Arc<Config>,
        store: StateStore,
        proxy: ProxyClient,
        workers: WorkerClient,
        bonus: BonusClient,
    ) -> (Self, watch::Receiver<LatestData>) {
        let mut seed = LatestData::default();
        if let Some(blob) = store.load_snapshot() {
            match serde_json::from_value::<LatestData>(blob) {
                Ok(data) => {
                    info!(
                        age_ms = chrono::Utc::now().timestamp_millis() - data.timestamp_ms,
                        "warm snapshot restored"
                    );
                    seed = data;
                }
                Err(e) => warn!(error = %e, "persisted snapshot unusable; starting cold"),
            }
        }

        let (tx, rx) = watch::channel(seed.clone());
        (
            Self {
                cfg,
                store,
                proxy,
                workers,
                bonus,
                tx,
                latest: seed,
            },
            rx,
        )
    }

    pub async fn run(mut self) {
        info!(
            interval_ms = self.cfg.update_interval_ms,
            "telemetry task started"
        );
        let mut interval = tokio::time::interval(Duration::from_millis(
            self.cfg.update_interval_ms.max(1_000),
        ));
        let mut iteration: u64 = 0;
        loop {
            interval.tick().await;
            self.tick(iteration).await;
            iteration += 1;
        }
    }

    async fn tick(&mut self, iteration: u64) {
        let now_ms = chrono::Utc::now().timestamp_millis();

        // Local snapshot files are disk I/O; keep them off the scheduler.
        let paths = self.cfg.stats.clone();
        let files = tokio::task::spawn_blocking(move || LocalFiles {
            p2p: collector::p2p_stats(&paths.p2p),
            pool: collector::pool_stats(&paths.pool),
            network: collector::network_stats(&paths.network),
            stratum: collector::stratum_workers(&paths.stratum),
        })
        .await
        .unwrap_or_default();

        let proxy_rows = match self.proxy.workers().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "proxy roster unavailable this tick");
                Vec::new()
            }
        };

        // Roster = proxy list, plus stratum-only workers the proxy has not
        // registered yet. Base rates come from the proxy; a worker's own API
        // overrides them when reachable.
        let mut snapshots: Vec<WorkerSnapshot> = proxy_rows
            .iter()
            .map(|row| WorkerSnapshot {
                name: row.name.clone(),
                ip: row.ip.clone(),
                online: false,
                h10: row.h1m,
                h60: row.h1m,
                h15: row.h10m,
                uptime_secs: row.uptime_secs,
            })
            .collect();
        for entry in &files.stratum {
            if !snapshots.iter().any(|w| w.name == entry.name) {
                snapshots.push(WorkerSnapshot {
                    name: entry.name.clone(),
                    ip: entry.ip.clone(),
                    ..WorkerSnapshot::default()
                });
            }
        }

        let summaries = futures::future::join_all(
            snapshots
                .iter()
                .map(|w| self.workers.get_summary(&w.name, &w.ip)),
        )
        .await;
        for (snapshot, summary) in snapshots.iter_mut().zip(summaries) {
            if let Some(summary) = summary {
                snapshot.online = true;
                snapshot.uptime_secs = summary.uptime_secs;
                if summary.h10 > 0.0 {
                    snapshot.h10 = summary.h10;
                }
                if summary.h60 > 0.0 {
                    snapshot.h60 = summary.h60;
                }
                if summary.h15 > 0.0 {
                    snapshot.h15 = summary.h15;
                }
            }
        }

        let (current_hr, stable_hr) = aggregate_fleet(&snapshots);
        track_share(&mut self.latest.shares, &files.pool);

        // Persist the tick: one history point attributed to the active
        // mode, refreshed worker registry, warm-boot snapshot.
        let mode = self.store.donation_stats().current_mode;
        let (p2pool_hr, xvb_hr) = match mode {
            Mode::P2pool => (stable_hr, 0.0),
            Mode::Xvb => (0.0, stable_hr),
        };
        self.store
            .append_history_point(stable_hr, p2pool_hr, xvb_hr)
            .await;

        let seen: Vec<(String, String)> = snapshots
            .iter()
            .filter(|w| !w.ip.is_empty() && w.ip != "0.0.0.0")
            .map(|w| (w.name.clone(), w.ip.clone()))
            .collect();
        self.store.upsert_workers(seen).await;

        self.latest = LatestData {
            timestamp_ms: now_ms,
            workers: snapshots,
            current_hr,
            stable_hr,
            pool: files.pool,
            network: files.network,
            p2p: files.p2p,
            shares: std::mem::take(&mut self.latest.shares),
        };

        let mut snapshot = self.latest.clone();
        if snapshot.shares.len() > SNAPSHOT_SHARES {
            snapshot.shares = snapshot.shares[snapshot.shares.len() - SNAPSHOT_SHARES..].to_vec();
        }
        match serde_json::to_value(&snapshot) {
            Ok(blob) => self.store.save_snapshot(blob).await,
            Err(e) => warn!(error = %e, "snapshot not serializable"),
        }

        if self.tx.send(self.latest.clone()).is_err() {
            warn!("no telemetry consumers left");
        }

        if iteration % self.cfg.xvb_sync_every.max(1) == 0 {
            self.sync_donation_stats().await;
        }
    }

    /// Throttled external sync. A failed or unparseable fetch counts
    /// against the failure counter; it never zeroes the stored averages.
    async fn sync_donation_stats(&self) {
        match self.bonus.fetch().await {
            Some(stats) => {
                info!(
                    avg_1h = %format_hashrate(stats.avg_1h),
                    avg_24h = %format_hashrate(stats.avg_24h),
                    fail_count = stats.fail_count,
                    "donation stats synced"
                );
                self.store
                    .apply_stats_patch(StatsPatch::averages(
                        stats.avg_1h,
                        stats.avg_24h,
                        stats.fail_count,
                    ))
                    .await;
            }
            None => {
                let fail_count = self.store.donation_stats().fail_count.saturating_add(1);
                warn!(fail_count, "donation stats sync failed");
                self.store
                    .apply_stats_patch(StatsPatch::fail_count(fail_count))
                    .await;
            }
        }
    }
}

/// Fleet totals over online workers: short window prefers the 10s average,
/// the stable total prefers the 15m average, each falling back to the next
/// best window the worker has filled.
fn aggregate_fleet(workers: &[WorkerSnapshot]) -> (f64, f64) {
    let mut current = 0.0;
    let mut stable = 0.0;
    for w in workers.iter().filter(|w| w.online) {
        current += if w.h10 > 0.0 { w.h10 } else { w.h60 };
        stable += if w.h15 > 0.0 {
            w.h15
        } else if w.h60 > 0.0 {
            w.h60
        } else {
            w.h10
        };
    }
    (current, stable)
}

/// Record a newly observed share when the pool's last-share timestamp
/// advances past everything already tracked.
fn track_share(shares: &mut Vec<ShareRecord>, pool: &LocalPoolStats) {
    let last_known = shares.last().map(|s| s.timestamp).unwrap_or(0);
    if pool.last_share_time > last_known && pool.last_share_time > 0 {
        shares.push(ShareRecord {
            timestamp: pool.last_share_time,
            difficulty: pool.difficulty,
        });
        if shares.len() > SHARES_CAP {
            let excess = shares.len() - SHARES_CAP;
            shares.drain(..excess);
        }
    }
}
