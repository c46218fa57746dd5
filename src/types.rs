//! Shared types for the DRAINER daemon.
//!
//! These types form the data model passed between the price oracle,
//! the batch sizer, the submission controller and the driver. Every
//! value here is ephemeral: it is rebuilt each cycle and never persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of wei in one gwei.
pub const WEI_PER_GWEI: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Batch sizing
// ---------------------------------------------------------------------------

/// A batch size that the remote estimator accepted within the cost ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetedBatch {
    /// Iterations to process in one submission (always >= 1).
    pub iterations: u64,
    /// Estimated cost (gas) for `iterations`, never above the ceiling.
    pub estimated_cost: u64,
}

/// Answer of the remote cost estimator for a given iteration count.
///
/// Exceeding the budget is an expected answer, not an error: it drives
/// the sizer's halving. Genuine failures travel in the surrounding `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostEstimate {
    Fits(u64),
    BudgetExceeded,
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Requested speed tier for the submission price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceLevel {
    SafeLow,
    Standard,
    /// Midpoint of `standard` and `fast`, derived rather than reported.
    #[default]
    AboveStandard,
    Fast,
    Fastest,
}

impl fmt::Display for ServiceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceLevel::SafeLow => "safe-low",
            ServiceLevel::Standard => "standard",
            ServiceLevel::AboveStandard => "above-standard",
            ServiceLevel::Fast => "fast",
            ServiceLevel::Fastest => "fastest",
        };
        write!(f, "{s}")
    }
}

/// Gas prices reported by a single feed, already normalized to wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasLevels {
    pub safe_low: u64,
    pub standard: u64,
    pub fast: u64,
    pub fastest: u64,
}

impl GasLevels {
    /// Price for a service level, in wei.
    pub fn level(&self, level: ServiceLevel) -> u64 {
        match level {
            ServiceLevel::SafeLow => self.safe_low,
            ServiceLevel::Standard => self.standard,
            ServiceLevel::AboveStandard => {
                // u128 so two near-max levels cannot overflow the sum
                ((self.fast as u128 + self.standard as u128) / 2) as u64
            }
            ServiceLevel::Fast => self.fast,
            ServiceLevel::Fastest => self.fastest,
        }
    }

    /// Reject payloads that parsed but carry a zero price.
    pub fn ensure_positive(self, feed: &str) -> anyhow::Result<Self> {
        if self.safe_low == 0 || self.standard == 0 || self.fast == 0 || self.fastest == 0 {
            anyhow::bail!("{feed} reported a zero gas price: {self:?}");
        }
        Ok(self)
    }
}

/// Which position in the feed priority order answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteSource {
    Primary,
    Fallback,
}

impl fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteSource::Primary => write!(f, "primary"),
            QuoteSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A normalized submission price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// Price per unit of cost, in wei.
    pub amount_wei: u64,
    pub source: QuoteSource,
    pub level: ServiceLevel,
    /// Name of the feed that answered.
    pub feed: String,
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} gwei ({} via {} {})",
            format_gwei(self.amount_wei),
            self.level,
            self.source,
            self.feed,
        )
    }
}

/// Render a wei amount as gwei for log lines.
pub fn format_gwei(wei: u64) -> String {
    Decimal::from_i128_with_scale(wei as i128, 9).normalize().to_string()
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Everything the ledger needs to process one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub iterations: u64,
    /// Gas limit attached to the transaction (estimate plus safety margin).
    pub cost_limit: u64,
    /// Gas price in wei.
    pub price: u64,
    pub sequence_number: u64,
}

/// Completion data emitted by the contract after processing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSignal {
    /// True once the queue has been fully drained.
    pub finished: bool,
}

/// Result of a mined submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: String,
    pub cost_used: u64,
    pub completion: Option<CompletionSignal>,
}

// ---------------------------------------------------------------------------
// Cycle state and outcome
// ---------------------------------------------------------------------------

/// Controller-owned view of the remote queue, replaced every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainState {
    pub has_pending_work: bool,
}

/// Why a cycle chose not to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    PriceCeilingExceeded { price: u64, ceiling: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PriceCeilingExceeded { price, ceiling } => write!(
                f,
                "price ceiling exceeded ({} gwei > {} gwei)",
                format_gwei(*price),
                format_gwei(*ceiling),
            ),
        }
    }
}

/// Terminal state of one drain cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing pending on the ledger.
    Idle,
    /// Work is pending but the cycle deferred it.
    Skipped(SkipReason),
    Submitted {
        iterations: u64,
        cost_used: u64,
        price_used: u64,
        /// Whether more work remains, so the driver should not sleep.
        continues: bool,
    },
    Failed(DrainError),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Idle => "idle",
            CycleOutcome::Skipped(_) => "skipped",
            CycleOutcome::Submitted { .. } => "submitted",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures that end a cycle as `Failed`. None of them stop the process.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("Price fetch failed (primary: {primary}; fallback: {fallback})")]
    PriceFetchFailed { primary: String, fallback: String },

    #[error("Batch unsizable: halving from {start_iterations} iterations never fit under {max_cost}")]
    BatchUnsizable { start_iterations: u64, max_cost: u64 },

    #[error("Cost estimation failed at {iterations} iterations: {message}")]
    Estimation { iterations: u64, message: String },

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Pending-work query failed: {0}")]
    PredicateQuery(String),

    #[error("Sequence number fetch failed: {0}")]
    SequenceNumber(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
