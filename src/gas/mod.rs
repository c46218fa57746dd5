//! Gas price feeds.
//!
//! Defines the `PriceFeed` trait and provides one implementation per
//! upstream schema. Each feed owns its payload parsing and converts its
//! native unit to wei before anything leaves the module.

pub mod gas_station;
pub mod gasnow;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use tracing::warn;

use crate::config::{AppConfig, FeedKind, PricingConfig};
use crate::types::GasLevels;

use self::gas_station::GasStationFeed;
use self::gasnow::GasNowFeed;

/// Abstraction over external gas price sources.
///
/// A feed performs exactly one request per call; retry cadence belongs
/// to the poll loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Feed name for logging and quote attribution.
    fn name(&self) -> &'static str;

    /// Fetch the current price levels, normalized to wei.
    async fn fetch_levels(&self) -> Result<GasLevels>;
}

/// Construct the feed selected by `kind` from the pricing config.
pub fn build_feed(kind: FeedKind, cfg: &PricingConfig) -> Result<Box<dyn PriceFeed>> {
    let feed: Box<dyn PriceFeed> = match kind {
        FeedKind::GasStation => {
            let api_key = cfg
                .gas_station
                .api_key_env
                .as_deref()
                .and_then(|env| match AppConfig::resolve_env(env) {
                    Ok(key) => Some(key),
                    Err(_) => {
                        warn!(env_var = env, "Gas Station API key not set, requesting without it");
                        None
                    }
                })
                .map(SecretString::new);
            Box::new(GasStationFeed::new(cfg.gas_station.url.clone(), api_key)?)
        }
        FeedKind::Gasnow => Box::new(GasNowFeed::new(cfg.gasnow.url.clone())?),
    };
    Ok(feed)
}
