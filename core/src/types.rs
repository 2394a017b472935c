//! Shared domain types for the donation controller.

use serde::{Deserialize, Serialize};

/// Which upstream pool the fleet is pointed at.
///
/// This is the physical routing state. Dispatch on this enum, never on the
/// human-readable label next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    P2pool,
    Xvb,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::P2pool => "P2POOL",
            Mode::Xvb => "XVB",
        }
    }

    pub fn parse_label(label: &str) -> Option<Mode> {
        match label {
            "P2POOL" => Some(Mode::P2pool),
            "XVB" => Some(Mode::Xvb),
            _ => None,
        }
    }

    /// The pool the fleet falls back to when this one is primary.
    pub fn other(&self) -> Mode {
        match self {
            Mode::P2pool => Mode::Xvb,
            Mode::Xvb => Mode::P2pool,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMode {
    P2pool,
    Xvb,
    Split,
}

/// Transient result of one engine evaluation. Never persisted; only its
/// effects (mode label, switching) are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub mode: DecisionMode,
    /// Milliseconds of the cycle to spend on XvB. Zero for P2POOL decisions,
    /// the full cycle for XVB decisions.
    pub xvb_duration_ms: u64,
}

impl Decision {
    pub fn p2pool() -> Self {
        Self {
            mode: DecisionMode::P2pool,
            xvb_duration_ms: 0,
        }
    }

    pub fn xvb(cycle_ms: u64) -> Self {
        Self {
            mode: DecisionMode::Xvb,
            xvb_duration_ms: cycle_ms,
        }
    }

    pub fn split(xvb_duration_ms: u64) -> Self {
        Self {
            mode: DecisionMode::Split,
            xvb_duration_ms,
        }
    }
}

/// Donation-side performance record, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationStats {
    /// Physical routing state last applied by the actuator.
    pub current_mode: Mode,
    /// Display annotation for the mode, e.g. "XVB (split)". Informational only.
    pub mode_label: String,
    /// 1-hour average hashrate credited by the donation service (H/s).
    pub avg_1h: f64,
    /// 24-hour average hashrate credited by the donation service (H/s).
    pub avg_24h: f64,
    /// Consecutive failure counter for the donation service. Only a
    /// successful sync reporting zero resets it.
    pub fail_count: u32,
    /// Unix ms of the last numeric update.
    pub last_update_ms: i64,
    /// Cumulative milliseconds the fleet has spent donating.
    pub total_donated_ms: u64,
}

impl Default for DonationStats {
    fn default() -> Self {
        Self {
            current_mode: Mode::P2pool,
            mode_label: Mode::P2pool.as_str().to_string(),
            avg_1h: 0.0,
            avg_24h: 0.0,
            fail_count: 0,
            last_update_ms: 0,
            total_donated_ms: 0,
        }
    }
}

/// Partial update for [`DonationStats`]. Fields left as `None` are untouched.
///
/// `last_update_ms` is bumped only when a numeric field actually changes;
/// mode changes alone do not count as a statistical update.
#[derive(Debug, Clone, Default)]
pub struct StatsPatch {
    pub mode: Option<Mode>,
    pub mode_label: Option<String>,
    pub avg_1h: Option<f64>,
    pub avg_24h: Option<f64>,
    pub fail_count: Option<u32>,
    pub add_donated_ms: Option<u64>,
}

impl StatsPatch {
    pub fn mode(mode: Mode, label: impl Into<String>) -> Self {
        Self {
            mode: Some(mode),
            mode_label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn averages(avg_1h: f64, avg_24h: f64, fail_count: u32) -> Self {
        Self {
            avg_1h: Some(avg_1h),
            avg_24h: Some(avg_24h),
            fail_count: Some(fail_count),
            ..Self::default()
        }
    }

    pub fn fail_count(count: u32) -> Self {
        Self {
            fail_count: Some(count),
            ..Self::default()
        }
    }

    pub fn donated(ms: u64) -> Self {
        Self {
            add_donated_ms: Some(ms),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.mode_label.is_none()
            && self.avg_1h.is_none()
            && self.avg_24h.is_none()
            && self.fail_count.is_none()
            && self.add_donated_ms.is_none()
    }
}

/// One point of the rolling hashrate time series.
///
/// The full tick's measured hashrate is attributed to the bucket of the mode
/// that was active when the sample was taken, so `p2pool_hr + xvb_hr`
/// equals `total_hr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp_ms: i64,
    pub total_hr: f64,
    #[serde(default)]
    pub p2pool_hr: f64,
    #[serde(default)]
    pub xvb_hr: f64,
}

/// One physical mining process, tracked so it can be switched even while it
/// is not currently reporting stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub last_seen_ms: i64,
}

/// An accepted share observed in the local pool's stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShareRecord {
    /// Unix seconds, as reported by the local pool.
    pub timestamp: i64,
    pub difficulty: u64,
}

/// Sidechain variant of the local pool, detected from its peer list.
/// Determines the seconds-per-block term of the PPLNS window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolVariant {
    #[default]
    Main,
    Mini,
    Nano,
}

impl PoolVariant {
    /// Sidechain block time. The low-difficulty variants run a 30s chain.
    pub fn seconds_per_block(&self) -> u64 {
        match self {
            PoolVariant::Main => 10,
            PoolVariant::Mini | PoolVariant::Nano => 30,
        }
    }
}
