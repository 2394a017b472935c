//! Shared-proxy telemetry client.
//!
//! The proxy in front of the fleet knows every connected worker; it is the
//! authoritative roster even when individual worker APIs are unreachable.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::ProxyConfig;

/// One worker as reported by the proxy roster.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyWorkerRow {
    pub name: String,
    pub ip: String,
    /// 1-minute and 10-minute averages, converted to H/s.
    pub h1m: f64,
    pub h10m: f64,
    pub uptime_secs: u64,
}

pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ProxyClient {
    pub fn new(cfg: &ProxyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            access_token: cfg.access_token.clone(),
        })
    }

    pub async fn workers(&self) -> Result<Vec<ProxyWorkerRow>> {
        let url = format!("{}/1/workers", self.base_url);
        let mut req = self.http.get(&url);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.context("proxy workers request")?;
        if !resp.status().is_success() {
            anyhow::bail!("proxy workers endpoint returned {}", resp.status());
        }
        let body: Value = resp.json().await.context("proxy workers body")?;
        Ok(parse_workers(&body))
    }
}

/// The proxy has two roster formats: the 6.x list-row format
/// `[name, ip, conns, accepted, ..., h1m@8, h10m@9, ...]` with kH/s values,
/// and a legacy object format with an H/s `hashrate` array.
fn parse_workers(body: &Value) -> Vec<ProxyWorkerRow> {
    let Some(entries) = body.get("workers").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::Array(row) if row.len() >= 10 => {
                let name = row[0].as_str().unwrap_or("").to_string();
                if name.is_empty() {
                    continue;
                }
                rows.push(ProxyWorkerRow {
                    name,
                    ip: row[1].as_str().unwrap_or("").to_string(),
                    h1m: row[8].as_f64().unwrap_or(0.0) * 1_000.0,
                    h10m: row[9].as_f64().unwrap_or(0.0) * 1_000.0,
                    uptime_secs: 0,
                });
            }
            Value::Object(obj) => {
                let name = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                if name.is_empty() {
                    continue;
                }
                let hr = obj.get("hashrate").and_then(Value::as_array);
                let window = |idx: usize| -> f64 {
                    hr.and_then(|h| h.get(idx))
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0)
                };
                rows.push(ProxyWorkerRow {
                    name,
                    ip: obj
                        .get("ip")
                        .and_then(Value::as_str)
                        .unwrap_or("0.0.0.0")
                        .to_string(),
                    h1m: window(1),
                    h10m: window(2),
                    uptime_secs: obj.get("uptime").and_then(Value::as_u64).unwrap_or(0),
                });
            }
            _ => {}
        }
    }
    rows
}
