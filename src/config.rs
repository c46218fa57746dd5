//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path in `DRAINER_CONFIG`) and deserializes
//! into strongly-typed structs. Secrets (feed API keys) are referenced by
//! env-var name in the config and resolved at runtime via `std::env::var`.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::{ServiceLevel, WEI_PER_GWEI};

/// Default config file path when `DRAINER_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub batch: BatchConfig,
    pub pricing: PricingConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Sleep between cycles when idle, skipped or failed.
    pub poll_interval_ms: u64,
    /// Upper bound on any single ledger or feed call. Unset means unbounded.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Iteration count the sizer starts halving from.
    pub default_iterations: u64,
    /// Gas ceiling for a single submission.
    pub max_cost: u64,
    /// Percentage added to the estimate to form the gas limit.
    #[serde(default = "default_safety_margin")]
    pub safety_margin_pct: Decimal,
}

fn default_safety_margin() -> Decimal {
    dec!(10)
}

/// Which gas price feed implementation to use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    GasStation,
    Gasnow,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default)]
    pub level: ServiceLevel,
    /// Price ceiling in gwei. Unset disables the ceiling check.
    #[serde(default)]
    pub max_price_gwei: Option<Decimal>,
    pub primary: FeedKind,
    #[serde(default)]
    pub fallback: Option<FeedKind>,
    #[serde(default)]
    pub gas_station: GasStationConfig,
    #[serde(default)]
    pub gasnow: GasNowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GasStationConfig {
    #[serde(default = "default_gas_station_url")]
    pub url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for GasStationConfig {
    fn default() -> Self {
        Self {
            url: default_gas_station_url(),
            api_key_env: None,
        }
    }
}

fn default_gas_station_url() -> String {
    "https://ethgasstation.info/api/ethgasAPI.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GasNowConfig {
    #[serde(default = "default_gasnow_url")]
    pub url: String,
}

impl Default for GasNowConfig {
    fn default() -> Self {
        Self {
            url: default_gasnow_url(),
        }
    }
}

fn default_gasnow_url() -> String {
    "https://www.gasnow.org/api/v3/gas/price".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Deployed queue contract to drive.
    pub contract_address: String,
    /// Node-managed account that signs submissions.
    pub sender_address: String,
    /// How long to wait for a submission to be mined.
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
}

fn default_receipt_timeout_ms() -> u64 {
    180_000
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the controller cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.poll_interval_ms == 0 {
            anyhow::bail!("agent.poll_interval_ms must be positive");
        }
        if self.agent.call_timeout_ms == Some(0) {
            anyhow::bail!("agent.call_timeout_ms must be positive when set");
        }
        if self.batch.default_iterations == 0 {
            anyhow::bail!("batch.default_iterations must be at least 1");
        }
        if self.batch.max_cost == 0 {
            anyhow::bail!("batch.max_cost must be positive");
        }
        if self.batch.safety_margin_pct.is_sign_negative() {
            anyhow::bail!("batch.safety_margin_pct must not be negative");
        }
        if self.pricing.fallback == Some(self.pricing.primary) {
            anyhow::bail!("pricing.fallback must differ from pricing.primary");
        }
        self.max_price_wei()?;
        self.ledger
            .contract_address
            .parse::<Address>()
            .with_context(|| format!("ledger.contract_address is not an address: {}", self.ledger.contract_address))?;
        self.ledger
            .sender_address
            .parse::<Address>()
            .with_context(|| format!("ledger.sender_address is not an address: {}", self.ledger.sender_address))?;
        if self.ledger.receipt_timeout_ms == 0 {
            anyhow::bail!("ledger.receipt_timeout_ms must be positive");
        }
        Ok(())
    }

    /// The price ceiling converted to wei, if one is configured.
    pub fn max_price_wei(&self) -> Result<Option<u64>> {
        let Some(gwei) = self.pricing.max_price_gwei else {
            return Ok(None);
        };
        if gwei <= Decimal::ZERO {
            anyhow::bail!("pricing.max_price_gwei must be positive, got {gwei}");
        }
        let wei = gwei
            .checked_mul(Decimal::from(WEI_PER_GWEI))
            .and_then(|v| v.trunc().to_u64())
            .with_context(|| format!("pricing.max_price_gwei out of range: {gwei}"))?;
        Ok(Some(wei))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.agent.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.agent.call_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
