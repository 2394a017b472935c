//! Donation-performance service client.
//!
//! The service reports bonus history as an HTML page keyed by wallet
//! address. A missing or unparseable response means "no update this cycle",
//! never a zeroing of stats.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::{BonusConfig, PLACEHOLDER_WALLET};
use crate::util::parse_hashrate;

#[derive(Debug, Clone, PartialEq)]
pub struct BonusStats {
    pub fail_count: u32,
    pub avg_1h: f64,
    pub avg_24h: f64,
}

pub struct BonusClient {
    http: reqwest::Client,
    url: String,
    address: String,
    re_fail: Regex,
    re_1h: Regex,
    re_24h: Regex,
}

impl BonusClient {
    pub fn new(cfg: &BonusConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            url: cfg.url.clone(),
            address: cfg.address.clone(),
            re_fail: Regex::new(r"(?i)Fail Count:\s*(\d+)")?,
            re_1h: Regex::new(r"(?i)1hr avg:\s*([\d\.]+)\s*([kKmMgG]?H/s)?")?,
            re_24h: Regex::new(r"(?i)24hr avg:\s*([\d\.]+)\s*([kKmMgG]?H/s)?")?,
        })
    }

    /// Fetch the latest bonus stats, or `None` if the service is
    /// unavailable or its response has changed shape.
    pub async fn fetch(&self) -> Option<BonusStats> {
        if self.address.is_empty() || self.address == PLACEHOLDER_WALLET {
            warn!("wallet address not configured; skipping donation stats sync");
            return None;
        }

        let resp = match self
            .http
            .get(&self.url)
            .query(&[("address", self.address.as_str())])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "donation service unreachable");
                return None;
            }
        };
        if !resp.status().is_success() {
            error!(status = %resp.status(), "donation service refused request");
            return None;
        }
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "donation service body unreadable");
                return None;
            }
        };

        self.parse_body(&body)
    }

    fn parse_body(&self, body: &str) -> Option<BonusStats> {
        let fail = self.re_fail.captures(body);
        let hr_1h = self.re_1h.captures(body);
        let hr_24h = self.re_24h.captures(body);

        if fail.is_none() && hr_1h.is_none() {
            warn!("donation service response missing expected fields; layout may have changed");
            return None;
        }

        let unit_of = |caps: &regex::Captures<'_>| -> Option<String> {
            caps.get(2).map(|m| m.as_str().to_string())
        };

        let mut stats = BonusStats {
            fail_count: 0,
            avg_1h: 0.0,
            avg_24h: 0.0,
        };
        if let Some(caps) = fail {
            stats.fail_count = caps[1].parse().unwrap_or(0);
        }
        if let Some(caps) = hr_1h {
            stats.avg_1h = parse_hashrate(&caps[1], unit_of(&caps).as_deref());
        }
        if let Some(caps) = hr_24h {
            stats.avg_24h = parse_hashrate(&caps[1], unit_of(&caps).as_deref());
        }
        Some(stats)
    }
}
