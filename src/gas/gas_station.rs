//! ETH Gas Station price feed.
//!
//! Reports `safeLow`, `average`, `fast` and `fastest` as JSON numbers in
//! tenths of a gwei (a reading of `420` means 42 gwei).
//!
//! API: `https://ethgasstation.info/api/ethgasAPI.json`
//! Auth: optional `api-key` query parameter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::PriceFeed;
use crate::types::GasLevels;

/// Wei in one Gas Station unit (0.1 gwei).
const WEI_PER_DECI_GWEI: Decimal = dec!(100000000);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasStationResponse {
    safe_low: Decimal,
    average: Decimal,
    fast: Decimal,
    fastest: Decimal,
}

pub struct GasStationFeed {
    http: Client,
    url: String,
    api_key: Option<SecretString>,
}

impl GasStationFeed {
    pub fn new(url: String, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("DRAINER/0.1.0")
            .build()
            .context("Failed to build Gas Station HTTP client")?;
        Ok(Self { http, url, api_key })
    }

    fn request_url(&self) -> String {
        match &self.api_key {
            Some(key) => format!(
                "{}?api-key={}",
                self.url,
                urlencoding::encode(key.expose_secret())
            ),
            None => self.url.clone(),
        }
    }

    /// Parse a raw payload and convert every level to wei.
    pub fn parse_payload(body: &str) -> Result<GasLevels> {
        let resp: GasStationResponse =
            serde_json::from_str(body).context("Malformed Gas Station payload")?;
        GasLevels {
            safe_low: to_wei(resp.safe_low, "safeLow")?,
            standard: to_wei(resp.average, "average")?,
            fast: to_wei(resp.fast, "fast")?,
            fastest: to_wei(resp.fastest, "fastest")?,
        }
        .ensure_positive("gas-station")
    }
}

fn to_wei(deci_gwei: Decimal, field: &str) -> Result<u64> {
    deci_gwei
        .checked_mul(WEI_PER_DECI_GWEI)
        .and_then(|wei| wei.trunc().to_u64())
        .with_context(|| format!("Gas Station {field} out of range: {deci_gwei}"))
}

#[async_trait]
impl PriceFeed for GasStationFeed {
    fn name(&self) -> &'static str {
        "gas-station"
    }

    async fn fetch_levels(&self) -> Result<GasLevels> {
        let resp = self
            .http
            .get(self.request_url())
            .send()
            .await
            .context("Gas Station request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Gas Station API error: {status}");
        }

        let body = resp.text().await.context("Failed to read Gas Station response")?;
        let levels = Self::parse_payload(&body)?;
        debug!(?levels, "Gas Station levels");
        Ok(levels)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
