//! Decision engine for the P2Pool/XvB arbitration.
//!
//! Pure function of its inputs: no I/O, no clock, no error path. Exceptional
//! inputs degrade to the safe default of full local mining.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tiers::TierTable;
use crate::types::{Decision, DonationStats};

/// Consecutive donation-service failures after which donating is suspended.
const FAIL_COUNT_LIMIT: u32 = 3;

/// Engine tunables, injected once at startup.
///
/// `margin_1h` and `tier_headroom` both carried divergent historical values
/// (0.05 / 0.15 / 0.2 across iterations of the algorithm); they are
/// configuration here, never constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global switch. Off means the fleet mines P2Pool unconditionally.
    pub xvb_enabled: bool,
    /// Full control-cycle length in milliseconds.
    pub cycle_ms: u64,
    /// Smallest XvB slice worth the cost of switching.
    pub min_send_ms: u64,
    /// Tolerance on the 1h average when checking tier fulfilment.
    pub margin_1h: f64,
    /// Fraction of stable hashrate reserved so a tier commitment never
    /// starves local mining (0.15 means tiers qualify against 85%).
    pub tier_headroom: f64,
    /// Overshoot applied to the donation target when sizing a split slice;
    /// the target is a floor, not a midpoint.
    pub duration_buffer: f64,
    /// Compensation for non-instantaneous pool switching.
    pub switch_overhead_ms: u64,
    /// A P2Pool remainder shorter than this is not worth a split; the whole
    /// cycle goes to XvB instead.
    pub min_p2pool_slice_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            xvb_enabled: true,
            cycle_ms: 60_000,
            min_send_ms: 15_000,
            margin_1h: 0.05,
            tier_headroom: 0.15,
            duration_buffer: 0.05,
            switch_overhead_ms: 1_000,
            min_p2pool_slice_ms: 10_000,
        }
    }
}

/// Health of the local pool as seen at decision time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolHealth {
    /// Accepted shares whose timestamp falls inside the current PPLNS
    /// window. Zero means donating would risk the payout position.
    pub shares_in_window: usize,
}

/// Snapshot of everything one decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct EngineInput<'a> {
    /// Short-window fleet hashrate (H/s); reacts fast to drops, used for
    /// slice sizing.
    pub current_hr: f64,
    /// Long-window fleet hashrate (H/s); used for tier qualification so a
    /// momentary spike cannot flap the tier.
    pub stable_hr: f64,
    pub pool_health: PoolHealth,
    pub stats: &'a DonationStats,
    pub tiers: &'a TierTable,
}

/// Decide the mode for the next cycle. Rules are evaluated in strict order;
/// the first match wins.
pub fn decide(cfg: &EngineConfig, input: &EngineInput<'_>) -> Decision {
    if !cfg.xvb_enabled {
        info!("decision: P2POOL (donation switching disabled)");
        return Decision::p2pool();
    }

    if input.pool_health.shares_in_window == 0 {
        info!("decision: P2POOL (no shares in PPLNS window)");
        return Decision::p2pool();
    }

    if input.stats.fail_count >= FAIL_COUNT_LIMIT {
        warn!(
            fail_count = input.stats.fail_count,
            "decision: P2POOL (donation service circuit breaker open)"
        );
        return Decision::p2pool();
    }

    let capacity = input.stable_hr * (1.0 - cfg.tier_headroom);
    let target_hr = match input.tiers.target_for(capacity) {
        Some(tier) => {
            debug!(
                tier = %tier.name,
                target_hr = tier.min_hashrate,
                capacity,
                "tier qualified"
            );
            tier.min_hashrate
        }
        None => {
            debug!(capacity, "decision: P2POOL (no tier within capacity)");
            return Decision::p2pool();
        }
    };

    let fulfilled = input.stats.avg_24h >= target_hr
        && input.stats.avg_1h >= target_hr * (1.0 - cfg.margin_1h);

    if !fulfilled {
        info!(
            target_hr,
            avg_24h = input.stats.avg_24h,
            avg_1h = input.stats.avg_1h,
            "decision: XVB full cycle (tier target not met)"
        );
        return Decision::xvb(cfg.cycle_ms);
    }

    // Maintenance slice. A dead fleet has nothing to send.
    if input.current_hr <= 0.0 {
        debug!("decision: P2POOL (no live hashrate to allocate)");
        return Decision::p2pool();
    }

    let fraction = target_hr * (1.0 + cfg.duration_buffer) / input.current_hr;
    let needed_ms = (fraction * cfg.cycle_ms as f64).ceil() as u64 + cfg.switch_overhead_ms;
    let needed_ms = needed_ms.max(cfg.min_send_ms);

    if needed_ms >= cfg.cycle_ms {
        info!(needed_ms, "decision: XVB full cycle (maintenance needs it all)");
        return Decision::xvb(cfg.cycle_ms);
    }

    let remainder_ms = cfg.cycle_ms - needed_ms;
    if remainder_ms < cfg.min_p2pool_slice_ms {
        info!(
            needed_ms,
            remainder_ms, "decision: XVB full cycle (remainder too short to split)"
        );
        return Decision::xvb(cfg.cycle_ms);
    }

    info!(
        xvb_ms = needed_ms,
        p2pool_ms = remainder_ms,
        "decision: SPLIT cycle"
    );
    Decision::split(needed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::{Tier, TierTable};
    use crate::types::DecisionMode;

    fn tiers_vip_mvp() -> TierTable {
        TierTable::new(vec![
            Tier {
                name: "VIP".to_string(),
                min_hashrate: 10_000.0,
            },
            Tier {
                name: "MVP".to_string(),
                min_hashrate: 5_000.0,
            },
        ])
    }

    fn stats(avg_1h: f64, avg_24h: f64, fail_count: u32) -> DonationStats {
        DonationStats {
            avg_1h,
            avg_24h,
            fail_count,
            ..DonationStats::default()
        }
    }

    struct Case {
        current_hr: f64,
        stable_hr: f64,
        shares: usize,
        stats: DonationStats,
    }

    impl Default for Case {
        fn default() -> Self {
            Self {
                current_hr: 100_000.0,
                stable_hr: 100_000.0,
                shares: 1,
                stats: stats(0.0, 0.0, 0),
            }
        }
    }

    fn run(cfg: &EngineConfig, case: &Case, tiers: &TierTable) -> Decision {
        decide(
            cfg,
            &EngineInput {
                current_hr: case.current_hr,
                stable_hr: case.stable_hr,
                pool_health: PoolHealth {
                    shares_in_window: case.shares,
                },
                stats: &case.stats,
                tiers,
            },
        )
    }

    #[test]
    fn zero_shares_forces_p2pool_regardless_of_everything_else() {
        let cfg = EngineConfig::default();
        let tiers = tiers_vip_mvp();
        for (current, stable, st) in [
            (100_000.0, 100_000.0, stats(0.0, 0.0, 0)),
            (1e9, 1e9, stats(1e9, 1e9, 0)),
            (0.0, 0.0, stats(0.0, 0.0, 99)),
        ] {
            let case = Case {
                current_hr: current,
                stable_hr: stable,
                shares: 0,
                stats: st,
            };
            assert_eq!(run(&cfg, &case, &tiers), Decision::p2pool());
        }
    }

    #[test]
    fn disabled_flag_wins_over_everything() {
        let cfg = EngineConfig {
            xvb_enabled: false,
            ..EngineConfig::default()
        };
        let case = Case::default();
        assert_eq!(run(&cfg, &case, &tiers_vip_mvp()), Decision::p2pool());
    }

    #[test]
    fn circuit_breaker_at_three_failures() {
        let cfg = EngineConfig::default();
        let tiers = tiers_vip_mvp();
        for fails in [3, 4, 100] {
            let case = Case {
                stats: stats(50_000.0, 50_000.0, fails),
                ..Case::default()
            };
            assert_eq!(run(&cfg, &case, &tiers), Decision::p2pool());
        }
        // Two failures is still below the breaker.
        let case = Case {
            stats: stats(0.0, 0.0, 2),
            ..Case::default()
        };
        assert_eq!(run(&cfg, &case, &tiers).mode, DecisionMode::Xvb);
    }

    #[test]
    fn unfulfilled_target_sends_a_full_cycle() {
        // stable 100k * 0.85 = 85k >= VIP 10k; averages at zero -> catch up.
        let cfg = EngineConfig::default();
        let case = Case::default();
        let decision = run(&cfg, &case, &tiers_vip_mvp());
        assert_eq!(decision, Decision::xvb(cfg.cycle_ms));
    }

    #[test]
    fn fulfilled_target_computes_a_split() {
        // avg_1h 9_500 >= 10_000 * 0.8 with a 0.2 margin -> fulfilled.
        let cfg = EngineConfig {
            margin_1h: 0.2,
            ..EngineConfig::default()
        };
        let case = Case {
            stats: stats(9_500.0, 20_000.0, 0),
            ..Case::default()
        };
        let decision = run(&cfg, &case, &tiers_vip_mvp());
        assert_eq!(decision.mode, DecisionMode::Split);
        // 10_000 * 1.05 / 100_000 * 60_000 = 6_300 + 1_000 overhead,
        // clamped up to the minimum send slice.
        assert_eq!(decision.xvb_duration_ms, cfg.min_send_ms);
    }

    #[test]
    fn split_duration_stays_within_bounds() {
        let cfg = EngineConfig {
            margin_1h: 0.2,
            ..EngineConfig::default()
        };
        let tiers = tiers_vip_mvp();
        for current in (5_000..500_000).step_by(7_919) {
            let case = Case {
                current_hr: current as f64,
                stable_hr: 100_000.0,
                stats: stats(20_000.0, 20_000.0, 0),
                ..Case::default()
            };
            let decision = run(&cfg, &case, &tiers);
            if decision.mode == DecisionMode::Split {
                assert!(decision.xvb_duration_ms >= cfg.min_send_ms);
                assert!(decision.xvb_duration_ms <= cfg.cycle_ms);
            }
        }
    }

    #[test]
    fn short_p2pool_remainder_promotes_to_full_cycle() {
        // Target close to capacity: the split remainder would be tiny.
        let cfg = EngineConfig::default();
        let tiers = TierTable::new(vec![Tier {
            name: "whale".to_string(),
            min_hashrate: 50_000.0,
        }]);
        let case = Case {
            current_hr: 60_000.0,
            stable_hr: 100_000.0,
            stats: stats(60_000.0, 60_000.0, 0),
            ..Case::default()
        };
        let decision = run(&cfg, &case, &tiers);
        assert_eq!(decision, Decision::xvb(cfg.cycle_ms));
    }

    #[test]
    fn zero_current_hashrate_on_fulfilled_path_degrades_to_p2pool() {
        let cfg = EngineConfig::default();
        let case = Case {
            current_hr: 0.0,
            stable_hr: 100_000.0,
            stats: stats(50_000.0, 50_000.0, 0),
            ..Case::default()
        };
        assert_eq!(run(&cfg, &case, &tiers_vip_mvp()), Decision::p2pool());
    }

    #[test]
    fn no_qualifying_tier_means_p2pool() {
        let cfg = EngineConfig::default();
        let case = Case {
            current_hr: 4_000.0,
            stable_hr: 4_000.0,
            ..Case::default()
        };
        assert_eq!(run(&cfg, &case, &tiers_vip_mvp()), Decision::p2pool());
    }

    #[test]
    fn tier_selection_is_monotonic_in_stable_hashrate() {
        let cfg = EngineConfig::default();
        let tiers = TierTable::defaults();
        let mut last_target = 0.0;
        for stable in (0..2_000_000u64).step_by(25_000) {
            let capacity = stable as f64 * (1.0 - cfg.tier_headroom);
            let target = tiers
                .target_for(capacity)
                .map(|t| t.min_hashrate)
                .unwrap_or(0.0);
            assert!(target >= last_target);
            last_target = target;
        }
    }

    #[test]
    fn identical_inputs_yield_identical_decisions() {
        let cfg = EngineConfig {
            margin_1h: 0.2,
            ..EngineConfig::default()
        };
        let case = Case {
            stats: stats(9_500.0, 20_000.0, 0),
            ..Case::default()
        };
        let tiers = tiers_vip_mvp();
        let first = run(&cfg, &case, &tiers);
        let second = run(&cfg, &case, &tiers);
        assert_eq!(first, second);
    }
}
