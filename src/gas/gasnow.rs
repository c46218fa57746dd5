//! GasNow price feed.
//!
//! Wraps its levels in a `{ code, data }` envelope and reports `slow`,
//! `standard`, `fast` and `rapid` directly in wei.
//!
//! API: `https://www.gasnow.org/api/v3/gas/price`
//! Auth: None required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::PriceFeed;
use crate::types::GasLevels;

#[derive(Debug, Deserialize)]
struct GasNowResponse {
    code: u16,
    #[serde(default)]
    data: Option<GasNowData>,
}

#[derive(Debug, Deserialize)]
struct GasNowData {
    rapid: u64,
    fast: u64,
    standard: u64,
    slow: u64,
}

pub struct GasNowFeed {
    http: Client,
    url: String,
}

impl GasNowFeed {
    pub fn new(url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("DRAINER/0.1.0")
            .build()
            .context("Failed to build GasNow HTTP client")?;
        Ok(Self { http, url })
    }

    /// Parse a raw payload. Amounts are already wei.
    pub fn parse_payload(body: &str) -> Result<GasLevels> {
        let resp: GasNowResponse =
            serde_json::from_str(body).context("Malformed GasNow payload")?;
        if resp.code != 200 {
            anyhow::bail!("GasNow reported code {}", resp.code);
        }
        let data = resp.data.context("GasNow payload has no data")?;
        GasLevels {
            safe_low: data.slow,
            standard: data.standard,
            fast: data.fast,
            fastest: data.rapid,
        }
        .ensure_positive("gasnow")
    }
}

#[async_trait]
impl PriceFeed for GasNowFeed {
    fn name(&self) -> &'static str {
        "gasnow"
    }

    async fn fetch_levels(&self) -> Result<GasLevels> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("GasNow request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("GasNow API error: {status}");
        }

        let body = resp.text().await.context("Failed to read GasNow response")?;
        let levels = Self::parse_payload(&body)?;
        debug!(?levels, "GasNow levels");
        Ok(levels)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
