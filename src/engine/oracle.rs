//! Price oracle aggregator.
//!
//! Queries the primary gas price feed and, when it fails, exactly one
//! fallback feed. Every quote leaves here in wei, whichever feed answered.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use super::bounded;
use crate::config::PricingConfig;
use crate::gas::{build_feed, PriceFeed};
use crate::types::{format_gwei, DrainError, PriceQuote, QuoteSource, ServiceLevel};

pub struct PriceOracle {
    primary: Box<dyn PriceFeed>,
    fallback: Option<Box<dyn PriceFeed>>,
    call_timeout: Option<Duration>,
}

impl PriceOracle {
    pub fn new(primary: Box<dyn PriceFeed>, fallback: Option<Box<dyn PriceFeed>>) -> Self {
        Self {
            primary,
            fallback,
            call_timeout: None,
        }
    }

    /// Build the feeds named in the pricing config.
    pub fn from_config(cfg: &PricingConfig) -> Result<Self> {
        let primary = build_feed(cfg.primary, cfg)?;
        let fallback = cfg.fallback.map(|kind| build_feed(kind, cfg)).transpose()?;
        Ok(Self::new(primary, fallback))
    }

    /// Bound each individual feed request.
    pub fn with_call_timeout(mut self, limit: Option<Duration>) -> Self {
        self.call_timeout = limit;
        self
    }

    /// Fetch a quote for `level`, falling back once if the primary fails.
    pub async fn fetch_price(&self, level: ServiceLevel) -> Result<PriceQuote, DrainError> {
        let primary_err = match self.fetch_from(self.primary.as_ref(), level, QuoteSource::Primary).await {
            Ok(quote) => return Ok(quote),
            Err(e) => format!("{e:#}"),
        };

        let Some(fallback) = self.fallback.as_deref() else {
            warn!(feed = self.primary.name(), error = %primary_err, "Primary gas feed failed, no fallback configured");
            return Err(DrainError::PriceFetchFailed {
                primary: primary_err,
                fallback: "no fallback configured".to_string(),
            });
        };

        warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_err,
            "Primary gas feed failed, falling back"
        );

        self.fetch_from(fallback, level, QuoteSource::Fallback)
            .await
            .map_err(|e| DrainError::PriceFetchFailed {
                primary: primary_err,
                fallback: format!("{e:#}"),
            })
    }

    async fn fetch_from(
        &self,
        feed: &dyn PriceFeed,
        level: ServiceLevel,
        source: QuoteSource,
    ) -> Result<PriceQuote> {
        let levels = bounded(self.call_timeout, feed.name(), feed.fetch_levels()).await?;
        let amount_wei = levels.level(level);
        if amount_wei == 0 {
            anyhow::bail!("{} reported a zero {level} price", feed.name());
        }

        info!(
            feed = feed.name(),
            %source,
            %level,
            price_gwei = %format_gwei(amount_wei),
            "Gas price fetched"
        );

        Ok(PriceQuote {
            amount_wei,
            source,
            level,
            feed: feed.name().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
