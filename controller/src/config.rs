//! Controller configuration.
//!
//! Defaults, optionally overlaid by a JSON config file, then by
//! `HASHPILOT_*` environment variables. Read once at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use hashpilot_core::{EngineConfig, Tier};

pub const PLACEHOLDER_WALLET: &str = "placeholder";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the LMDB state store.
    pub data_dir: PathBuf,
    /// Telemetry refresh period.
    pub update_interval_ms: u64,
    /// Donation-service sync happens every Nth telemetry tick.
    pub xvb_sync_every: u64,
    pub history_retention_secs: u64,
    pub worker_retention_secs: u64,
    /// Fallback PPLNS window length (blocks) when the local pool stats do
    /// not report one.
    pub pplns_window_blocks: u64,
    pub algo: EngineConfig,
    pub pools: PoolsConfig,
    pub proxy: ProxyConfig,
    pub worker_api: WorkerApiConfig,
    pub stats: StatsPaths,
    pub bonus: BonusConfig,
    pub tiers: Vec<Tier>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            update_interval_ms: 15_000,
            xvb_sync_every: 10,
            history_retention_secs: 2 * 24 * 3600,
            worker_retention_secs: 3 * 24 * 3600,
            pplns_window_blocks: 2_160,
            algo: EngineConfig::default(),
            pools: PoolsConfig::default(),
            proxy: ProxyConfig::default(),
            worker_api: WorkerApiConfig::default(),
            stats: StatsPaths::default(),
            bonus: BonusConfig::default(),
            tiers: hashpilot_core::TierTable::defaults().iter().cloned().collect(),
        }
    }
}

/// The two upstream pools the fleet is arbitrated between.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    pub p2pool_url: String,
    /// Wallet address used as the P2Pool login.
    pub p2pool_user: String,
    pub xvb_url: String,
    /// Donor identity used as the XvB login.
    pub xvb_user: String,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            p2pool_url: "127.0.0.1:3333".to_string(),
            p2pool_user: PLACEHOLDER_WALLET.to_string(),
            xvb_url: "pool.xmrvsbeast.com:4247".to_string(),
            xvb_user: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub url: String,
    pub access_token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            access_token: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerApiConfig {
    /// HTTP API port every worker exposes.
    pub port: u16,
    /// Per-candidate request timeout; candidates are tried in order, so this
    /// stays short.
    pub timeout_ms: u64,
}

impl Default for WorkerApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            timeout_ms: 1_500,
        }
    }
}

/// Locations of the local telemetry snapshot files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsPaths {
    pub p2p: PathBuf,
    pub pool: PathBuf,
    pub network: PathBuf,
    pub stratum: PathBuf,
}

impl Default for StatsPaths {
    fn default() -> Self {
        Self::under("stats")
    }
}

impl StatsPaths {
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            p2p: base.join("local/p2p"),
            pool: base.join("pool/stats"),
            network: base.join("network/stats"),
            stratum: base.join("local/stratum"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusConfig {
    pub url: String,
    /// Wallet address the donation service keys its bonus history by.
    pub address: String,
    pub timeout_ms: u64,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            url: "https://xmrvsbeast.com/cgi-bin/p2pool_bonus_history.cgi".to_string(),
            address: PLACEHOLDER_WALLET.to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut cfg = Self::default();

        let config_path = std::env::var("HASHPILOT_CONFIG")
            .unwrap_or_else(|_| "hashpilot.json".to_string());
        if let Ok(raw) = std::fs::read_to_string(&config_path) {
            match serde_json::from_str::<Config>(&raw) {
                Ok(file_cfg) => cfg = file_cfg,
                Err(e) => warn!(path = %config_path, error = %e, "config file ignored"),
            }
        }

        if let Ok(dir) = std::env::var("HASHPILOT_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("HASHPILOT_STATS_DIR") {
            cfg.stats = StatsPaths::under(dir);
        }
        if let Ok(wallet) = std::env::var("HASHPILOT_WALLET") {
            cfg.pools.p2pool_user = wallet.clone();
            cfg.bonus.address = wallet;
        }
        if let Ok(donor) = std::env::var("HASHPILOT_DONOR_ID") {
            cfg.pools.xvb_user = donor;
        }
        if let Ok(url) = std::env::var("HASHPILOT_P2POOL_URL") {
            cfg.pools.p2pool_url = url;
        }
        if let Ok(url) = std::env::var("HASHPILOT_XVB_URL") {
            cfg.pools.xvb_url = url;
        }
        if let Ok(url) = std::env::var("HASHPILOT_PROXY_URL") {
            cfg.proxy.url = url;
        }
        if let Ok(token) = std::env::var("HASHPILOT_PROXY_TOKEN") {
            cfg.proxy.access_token = Some(token);
        }
        if let Ok(ms) = std::env::var("HASHPILOT_UPDATE_INTERVAL_MS") {
            cfg.update_interval_ms = ms.parse().unwrap_or(cfg.update_interval_ms);
        }
        if let Ok(ms) = std::env::var("HASHPILOT_CYCLE_MS") {
            cfg.algo.cycle_ms = ms.parse().unwrap_or(cfg.algo.cycle_ms);
        }
        if std::env::var("HASHPILOT_DISABLE_XVB").is_ok() {
            cfg.algo.xvb_enabled = false;
        }

        cfg.validate();
        cfg
    }

    fn validate(&self) {
        if self.pools.p2pool_user == PLACEHOLDER_WALLET || self.pools.p2pool_user.is_empty() {
            warn!("wallet address not configured; donation sync and P2Pool login will be inert");
        }
        if self.pools.xvb_user.is_empty() {
            warn!("donor id not configured; XvB switches will log in anonymously");
        }
        if self.algo.min_send_ms > self.algo.cycle_ms {
            warn!(
                min_send_ms = self.algo.min_send_ms,
                cycle_ms = self.algo.cycle_ms,
                "min_send_ms exceeds the cycle length; splits will always promote to full cycles"
            );
        }
    }
}
