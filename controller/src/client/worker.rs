//! Per-worker control endpoint client.
//!
//! Workers are reached through an ordered candidate list: DNS hostname,
//! mDNS hostname, raw IP. The first candidate that answers wins; exhausting
//! the list is an ordinary outcome, never an error that could block the
//! rest of the fleet.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

/// Auth token a worker expects: its bare hostname, with any `+diff`
/// difficulty suffix stripped from the stratum name.
pub fn auth_token(name: &str) -> &str {
    name.split('+').next().unwrap_or(name).trim()
}

/// Ordered connection candidates for one worker. Failover order is part of
/// the contract and independently tested.
pub fn candidate_addrs(name: &str, ip: &str) -> Vec<String> {
    let mut candidates = Vec::with_capacity(3);
    let host = auth_token(name);
    if !host.is_empty() {
        candidates.push(host.to_string());
        candidates.push(format!("{host}.local"));
    }
    if !ip.is_empty() && ip != "0.0.0.0" {
        candidates.push(ip.to_string());
    }
    candidates
}

/// Stats a worker reports about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerSummary {
    pub uptime_secs: u64,
    /// 10s / 60s / 15m hashrate windows, H/s.
    pub h10: f64,
    pub h60: f64,
    pub h15: f64,
}

#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    port: u16,
}

impl WorkerClient {
    pub fn new(port: u16, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, port })
    }

    /// Fetch a worker's self-reported stats, trying each candidate in order.
    pub async fn get_summary(&self, name: &str, ip: &str) -> Option<WorkerSummary> {
        let token = auth_token(name).to_string();
        for addr in candidate_addrs(name, ip) {
            let url = format!("http://{}:{}/1/summary", addr, self.port);
            match self.http.get(&url).bearer_auth(&token).send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(body) = resp.json::<Value>().await {
                        return Some(parse_summary(&body));
                    }
                }
                Ok(resp) => debug!(worker = name, %addr, status = %resp.status(), "worker api refused"),
                Err(e) => debug!(worker = name, %addr, error = %e, "worker api unreachable"),
            }
        }
        None
    }

    /// Replace the worker's pool list, preserving the rest of its
    /// configuration: read the current config from the first responding
    /// candidate, swap the pools, write it back to the same candidate.
    ///
    /// Returns whether the worker was reconfigured.
    pub async fn apply_pools(&self, name: &str, ip: &str, pools: &Value) -> bool {
        let token = auth_token(name).to_string();
        for addr in candidate_addrs(name, ip) {
            let config_url = format!("http://{}:{}/1/config", addr, self.port);

            let current = match self.http.get(&config_url).bearer_auth(&token).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                    Ok(body) => body,
                    Err(e) => {
                        debug!(worker = name, %addr, error = %e, "worker config unparseable");
                        continue;
                    }
                },
                Ok(resp) => {
                    debug!(worker = name, %addr, status = %resp.status(), "worker config refused");
                    continue;
                }
                Err(e) => {
                    debug!(worker = name, %addr, error = %e, "worker unreachable");
                    continue;
                }
            };

            let mut updated = current;
            if !updated.is_object() {
                debug!(worker = name, %addr, "worker config has unexpected shape");
                continue;
            }
            updated["pools"] = pools.clone();

            match self
                .http
                .put(&config_url)
                .bearer_auth(&token)
                .json(&updated)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return true,
                Ok(resp) => {
                    debug!(worker = name, %addr, status = %resp.status(), "worker rejected config")
                }
                Err(e) => debug!(worker = name, %addr, error = %e, "worker config push failed"),
            }
        }
        false
    }
}

fn parse_summary(body: &Value) -> WorkerSummary {
    let windows = body
        .get("hashrate")
        .and_then(|h| h.get("total"))
        .and_then(Value::as_array);
    // xmrig reports null for windows it has not filled yet.
    let window = |idx: usize| -> f64 {
        windows
            .and_then(|w| w.get(idx))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    WorkerSummary {
        uptime_secs: body.get("uptime").and_then(Value::as_u64).unwrap_or(0),
        h10: window(0),
        h60: window(1),
        h15: window(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidates_in_failover_order() {
        assert_eq!(
            candidate_addrs("rig1", "192.168.1.50"),
            vec!["rig1", "rig1.local", "192.168.1.50"]
        );
    }

    #[test]
    fn candidates_skip_blank_fields() {
        assert_eq!(candidate_addrs("", "192.168.1.50"), vec!["192.168.1.50"]);
        assert_eq!(candidate_addrs("rig1", "0.0.0.0"), vec!["rig1", "rig1.local"]);
        assert!(candidate_addrs("", "0.0.0.0").is_empty());
    }

    #[test]
    fn token_strips_difficulty_suffix() {
        assert_eq!(auth_token("rig1+50000"), "rig1");
        assert_eq!(auth_token("rig1"), "rig1");
    }

    #[test]
    fn summary_tolerates_null_windows() {
        let body = json!({
            "uptime": 3600,
            "hashrate": {"total": [1200.0, null, 1100.0]}
        });
        let summary = parse_summary(&body);
        assert_eq!(summary.uptime_secs, 3600);
        assert_eq!(summary.h10, 1200.0);
        assert_eq!(summary.h60, 0.0);
        assert_eq!(summary.h15, 1100.0);
    }
}
