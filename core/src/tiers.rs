//! Donation tier table.
//!
//! Maps a reward-tier name to the minimum hashrate that must be sustained on
//! the donation pool to hold it. Refreshed out-of-band (scraper or static
//! defaults); the engine only reads it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    /// Minimum qualifying hashrate in H/s. Tiers at zero are participation
    /// levels without a commitment and never become a donation target.
    pub min_hashrate: f64,
}

/// Ordered tier set, strictly descending by threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(mut tiers: Vec<Tier>) -> Self {
        tiers.sort_by(|a, b| {
            b.min_hashrate
                .partial_cmp(&a.min_hashrate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self { tiers }
    }

    /// Baseline thresholds used until a refresh supplies real ones.
    pub fn defaults() -> Self {
        Self::new(vec![
            Tier {
                name: "donor_mega".to_string(),
                min_hashrate: 1_000_000.0,
            },
            Tier {
                name: "donor_whale".to_string(),
                min_hashrate: 50_000.0,
            },
            Tier {
                name: "donor_vip".to_string(),
                min_hashrate: 10_000.0,
            },
            Tier {
                name: "mvp".to_string(),
                min_hashrate: 5_000.0,
            },
        ])
    }

    /// Highest tier whose threshold fits inside `capacity`, or `None` when
    /// no commitment-carrying tier qualifies.
    pub fn target_for(&self, capacity: f64) -> Option<&Tier> {
        self.tiers
            .iter()
            .find(|t| t.min_hashrate > 0.0 && capacity >= t.min_hashrate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::defaults()
    }
}
