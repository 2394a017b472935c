//! Local telemetry file collectors.
//!
//! The local pool and node periodically write JSON snapshots to disk; these
//! readers consume them tolerantly. A missing, partially written or corrupt
//! file yields the type's default — never an error, never a crash of the
//! collection tick.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hashpilot_core::{PoolVariant, ShareRecord};

fn read_json(path: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Sidechain peering state of the local pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct P2pStats {
    pub variant: PoolVariant,
    pub connections: u64,
    pub peers_count: u64,
    pub uptime_secs: u64,
}

/// Pool statistics relevant to the decision engine and dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPoolStats {
    pub hashrate: f64,
    pub miners: u64,
    pub sidechain_height: u64,
    /// PPLNS window length in blocks; zero when the pool did not report it.
    pub pplns_window_blocks: u64,
    /// Unix seconds of the most recent accepted share.
    pub last_share_time: i64,
    pub difficulty: u64,
    pub shares_found: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub height: u64,
    pub difficulty: u64,
    pub reward: u64,
}

/// One worker row from the stratum snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StratumWorker {
    pub ip: String,
    pub name: String,
}

/// Detect the sidechain variant from peer addresses: each variant listens on
/// a distinct well-known port. Majority wins; no peers means the default
/// (strictest) window.
pub fn detect_pool_variant(peers: &[String]) -> PoolVariant {
    let mut main = 0usize;
    let mut mini = 0usize;
    let mut nano = 0usize;
    for peer in peers {
        if peer.contains("37889") {
            main += 1;
        } else if peer.contains("37888") {
            mini += 1;
        } else if peer.contains("37890") {
            nano += 1;
        }
    }
    if mini > main && mini >= nano {
        PoolVariant::Mini
    } else if nano > main && nano > mini {
        PoolVariant::Nano
    } else {
        PoolVariant::Main
    }
}

pub fn p2p_stats(path: &Path) -> P2pStats {
    let Some(raw) = read_json(path) else {
        return P2pStats::default();
    };
    let peers: Vec<String> = raw
        .get("peers")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    P2pStats {
        variant: detect_pool_variant(&peers),
        connections: raw.get("connections").and_then(Value::as_u64).unwrap_or(0),
        peers_count: raw
            .get("peer_list_size")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        uptime_secs: raw.get("uptime").and_then(Value::as_u64).unwrap_or(0),
    }
}

pub fn pool_stats(path: &Path) -> LocalPoolStats {
    let Some(raw) = read_json(path) else {
        return LocalPoolStats::default();
    };
    let stats = raw.get("pool_statistics").cloned().unwrap_or(Value::Null);
    LocalPoolStats {
        hashrate: stats.get("hashRate").and_then(Value::as_f64).unwrap_or(0.0),
        miners: stats.get("miners").and_then(Value::as_u64).unwrap_or(0),
        sidechain_height: stats
            .get("sidechainHeight")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        pplns_window_blocks: stats
            .get("pplnsWindowSize")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        last_share_time: stats
            .get("lastShareFoundTime")
            .or_else(|| stats.get("lastBlockFoundTime"))
            .and_then(Value::as_i64)
            .unwrap_or(0),
        difficulty: stats
            .get("sidechainDifficulty")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        shares_found: stats.get("sharesFound").and_then(Value::as_u64).unwrap_or(0),
    }
}

pub fn network_stats(path: &Path) -> NetworkStats {
    let Some(raw) = read_json(path) else {
        return NetworkStats::default();
    };
    NetworkStats {
        height: raw.get("height").and_then(Value::as_u64).unwrap_or(0),
        difficulty: raw.get("difficulty").and_then(Value::as_u64).unwrap_or(0),
        reward: raw.get("reward").and_then(Value::as_u64).unwrap_or(0),
    }
}

/// Worker rows from the stratum snapshot. Row format:
/// `"ip,uptime,?,hashrate,name"`.
pub fn stratum_workers(path: &Path) -> Vec<StratumWorker> {
    let Some(raw) = read_json(path) else {
        return Vec::new();
    };
    let Some(entries) = raw.get("workers").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut workers = Vec::new();
    for entry in entries {
        let Some(row) = entry.as_str() else { continue };
        let parts: Vec<&str> = row.split(',').collect();
        if parts.is_empty() || parts[0].is_empty() {
            continue;
        }
        workers.push(StratumWorker {
            ip: parts[0].to_string(),
            name: parts
                .get(4)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "miner".to_string()),
        });
    }
    workers
}

/// Count accepted shares still inside the current PPLNS window.
/// Window seconds = window blocks x the variant's block time; a qualifying
/// share has a timestamp within `[now - window, now]`.
pub fn shares_in_window(
    shares: &[ShareRecord],
    window_blocks: u64,
    variant: PoolVariant,
    now_secs: i64,
) -> usize {
    let window_secs = (window_blocks * variant.seconds_per_block()) as i64;
    let cutoff = now_secs - window_secs;
    shares
        .iter()
        .filter(|s| s.timestamp >= cutoff && s.timestamp <= now_secs)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn variant_detection_majority_wins() {
        let mini_peers: Vec<String> = vec![
            "10.0.0.1:37888".into(),
            "10.0.0.2:37888".into(),
            "10.0.0.3:37889".into(),
        ];
        assert_eq!(detect_pool_variant(&mini_peers), PoolVariant::Mini);

        let nano_peers: Vec<String> = vec!["10.0.0.1:37890".into()];
        assert_eq!(detect_pool_variant(&nano_peers), PoolVariant::Nano);

        assert_eq!(detect_pool_variant(&[]), PoolVariant::Main);
    }

    #[test]
    fn pool_stats_reads_nested_statistics() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "stats",
            r#"{"pool_statistics": {"hashRate": 152000.5, "miners": 3,
                "sidechainHeight": 9123456, "pplnsWindowSize": 2160,
                "lastShareFoundTime": 1700000000, "sidechainDifficulty": 120000,
                "sharesFound": 42}}"#,
        );
        let stats = pool_stats(&path);
        assert_eq!(stats.hashrate, 152_000.5);
        assert_eq!(stats.pplns_window_blocks, 2_160);
        assert_eq!(stats.last_share_time, 1_700_000_000);
        assert_eq!(stats.shares_found, 42);
    }

    #[test]
    fn missing_or_corrupt_files_yield_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            pool_stats(&dir.path().join("nope")),
            LocalPoolStats::default()
        );
        let corrupt = write_file(&dir, "bad", "{ not json");
        assert_eq!(pool_stats(&corrupt), LocalPoolStats::default());
        assert_eq!(network_stats(&corrupt), NetworkStats::default());
        assert!(stratum_workers(&corrupt).is_empty());
    }

    #[test]
    fn stratum_rows_parse_ip_and_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "stratum",
            r#"{"workers": ["192.168.1.50,3600,x,1200,rig1", "192.168.1.51,60", 7]}"#,
        );
        let workers = stratum_workers(&path);
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].name, "rig1");
        assert_eq!(workers[0].ip, "192.168.1.50");
        // Short rows fall back to a generic name.
        assert_eq!(workers[1].name, "miner");
    }

    #[test]
    fn share_window_counts_only_recent_shares() {
        let now = 1_700_000_000i64;
        let shares = vec![
            ShareRecord {
                timestamp: now - 10,
                difficulty: 1,
            },
            ShareRecord {
                timestamp: now - 21_000,
                difficulty: 1,
            },
            ShareRecord {
                timestamp: now - 23_000,
                difficulty: 1,
            },
        ];
        // Main variant: 2160 blocks x 10s = 21600s window.
        assert_eq!(
            shares_in_window(&shares, 2_160, PoolVariant::Main, now),
            2
        );
        // Mini variant: 30s blocks widen the window to 64800s.
        assert_eq!(
            shares_in_window(&shares, 2_160, PoolVariant::Mini, now),
            3
        );
        // Zero-length window qualifies nothing in the past.
        assert_eq!(shares_in_window(&shares, 0, PoolVariant::Main, now), 0);
    }
}
