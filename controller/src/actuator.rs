//! Switching actuator.
//!
//! Makes a target mode physically true by reconfiguring every known worker
//! to route its hashes to the matching upstream pool. Workers are switched
//! one by one; an unreachable worker is logged and skipped — it can never
//! block or fail the switch for the rest of the fleet.

use serde_json::{json, Value};
use tracing::{info, warn};

use hashpilot_core::{Mode, StateStore, StatsPatch};

use crate::client::WorkerClient;
use crate::config::PoolsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Switcher {
    store: StateStore,
    client: WorkerClient,
    pools: PoolsConfig,
}

impl Switcher {
    pub fn new(store: StateStore, client: WorkerClient, pools: PoolsConfig) -> Self {
        Self {
            store,
            client,
            pools,
        }
    }

    /// Point the fleet at `mode`'s upstream pool and record the new mode
    /// label. The registry is used rather than live telemetry so workers in
    /// a reporting gap still get switched.
    pub async fn switch_to(&self, mode: Mode, label: &str) -> SwitchReport {
        let workers = self.store.known_workers();
        let pools = self.pool_pair(mode);

        let mut report = SwitchReport::default();
        for worker in &workers {
            if self.client.apply_pools(&worker.name, &worker.ip, &pools).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                warn!(worker = %worker.name, "worker unreachable during switch; continuing");
            }
        }

        // Label and physical state must not drift apart for more than one
        // tick; the label follows every applied switch immediately.
        self.store
            .apply_stats_patch(StatsPatch::mode(mode, label))
            .await;

        info!(
            mode = %mode,
            label,
            succeeded = report.succeeded,
            failed = report.failed,
            "fleet switch applied"
        );
        report
    }

    /// Ordered pool pair for a worker config: the target pool enabled and
    /// primary, the other pool disabled as the idle fallback slot.
    fn pool_pair(&self, mode: Mode) -> Value {
        let p2pool = |enabled: bool| {
            json!({
                "url": self.pools.p2pool_url,
                "user": self.pools.p2pool_user,
                "pass": "x",
                "enabled": enabled,
                "coin": "monero",
            })
        };
        let xvb = |enabled: bool| {
            json!({
                "url": self.pools.xvb_url,
                "user": self.pools.xvb_user,
                "pass": "x",
                "enabled": enabled,
                "coin": "monero",
            })
        };
        match mode {
            Mode::P2pool => json!([p2pool(true), xvb(false)]),
            Mode::Xvb => json!([xvb(true), p2pool(false)]),
        }
    }
}
