//! Control loop.
//!
//! Drives the decision/actuation cycle: read the latest telemetry, decide,
//! switch the fleet, persist the mode, hold for the decided duration. SPLIT
//! decisions run as a two-phase hold. Every tick re-decides from fresh
//! inputs, so ticks are independently idempotent and nothing is resumed
//! after an error — just logged, backed off, retried.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use hashpilot_core::{decide, DecisionMode, EngineInput, Mode, PoolHealth, StateStore, StatsPatch};

use crate::actuator::Switcher;
use crate::collector;
use crate::config::Config;
use crate::telemetry::LatestData;

/// Delay before the first decision, giving telemetry a head start.
const STARTUP_GRACE: Duration = Duration::from_secs(5);
/// Backoff after a failed tick.
const TICK_BACKOFF: Duration = Duration::from_secs(10);

pub struct ControlLoop {
    cfg: Arc<Config>,
    store: StateStore,
    switcher: Switcher,
    rx: watch::Receiver<LatestData>,
}

impl ControlLoop {
    pub fn new(
        cfg: Arc<Config>,
        store: StateStore,
        switcher: Switcher,
        rx: watch::Receiver<LatestData>,
    ) -> Self {
        Self {
            cfg,
            store,
            switcher,
            rx,
        }
    }

    pub async fn run(mut self) {
        info!(cycle_ms = self.cfg.algo.cycle_ms, "control loop started");
        tokio::time::sleep(STARTUP_GRACE).await;

        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "control tick failed; backing off");
                tokio::time::sleep(TICK_BACKOFF).await;
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        if self.rx.has_changed().is_err() {
            anyhow::bail!("telemetry task stopped publishing");
        }
        let latest = self.rx.borrow().clone();
        let now_ms = chrono::Utc::now().timestamp_millis();

        if is_stale(now_ms, latest.timestamp_ms, self.cfg.update_interval_ms) {
            warn!(
                age_ms = now_ms - latest.timestamp_ms,
                "deciding on stale telemetry"
            );
        }

        let shares = qualifying_shares(&latest, self.cfg.pplns_window_blocks, now_ms / 1000);
        let stats = self.store.donation_stats();
        let tiers = self.store.tiers();

        let decision = decide(
            &self.cfg.algo,
            &EngineInput {
                current_hr: latest.current_hr,
                stable_hr: latest.stable_hr,
                pool_health: PoolHealth {
                    shares_in_window: shares,
                },
                stats: &stats,
                tiers: &tiers,
            },
        );

        let cycle_ms = self.cfg.algo.cycle_ms;
        match decision.mode {
            DecisionMode::P2pool => {
                self.switcher.switch_to(Mode::P2pool, "P2POOL").await;
                hold(cycle_ms).await;
            }
            DecisionMode::Xvb => {
                self.switcher.switch_to(Mode::Xvb, "XVB").await;
                hold(cycle_ms).await;
                self.store
                    .apply_stats_patch(StatsPatch::donated(cycle_ms))
                    .await;
            }
            DecisionMode::Split => {
                let xvb_ms = decision.xvb_duration_ms.min(cycle_ms);
                self.switcher.switch_to(Mode::Xvb, "XVB (split)").await;
                hold(xvb_ms).await;
                self.store
                    .apply_stats_patch(StatsPatch::donated(xvb_ms))
                    .await;

                self.switcher
                    .switch_to(Mode::P2pool, "P2POOL (split)")
                    .await;
                hold(cycle_ms - xvb_ms).await;
            }
        }
        Ok(())
    }
}

async fn hold(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Telemetry older than two collection periods is a health concern; the
/// loop still proceeds, since empty or stale inputs already decide the
/// safe default.
fn is_stale(now_ms: i64, telemetry_ms: i64, update_interval_ms: u64) -> bool {
    telemetry_ms > 0 && now_ms - telemetry_ms > 2 * update_interval_ms as i64
}

/// Shares inside the local pool's current PPLNS window, using the pool's
/// reported window size when present.
fn qualifying_shares(latest: &LatestData, fallback_blocks: u64, now_secs: i64) -> usize {
    let window_blocks = if latest.pool.pplns_window_blocks > 0 {
        latest.pool.pplns_window_blocks
    } else {
        fallback_blocks
    };
    collector::shares_in_window(&latest.shares, window_blocks, latest.p2p.variant, now_secs)
}
