//! Submission controller.
//!
//! Runs one drain cycle: check pending → size → price → ceiling check →
//! submit → interpret. Every expected failure is caught here and turned
//! into `CycleOutcome::Failed`; nothing inside a cycle stops the process.

use anyhow::Result;
use rust_decimal::prelude::*;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::bounded;
use super::oracle::PriceOracle;
use super::sizer::size_batch;
use crate::config::AppConfig;
use crate::ledger::LedgerClient;
use crate::types::{
    format_gwei, CycleOutcome, DrainError, DrainState, ServiceLevel, SkipReason, SubmitRequest,
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Values the controller needs each cycle, with prices already in wei.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub default_iterations: u64,
    pub max_cost: u64,
    /// Price ceiling in wei; `None` disables the check.
    pub max_price: Option<u64>,
    pub safety_margin_pct: Decimal,
    pub price_level: ServiceLevel,
    pub call_timeout: Option<Duration>,
}

impl ControllerSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            default_iterations: cfg.batch.default_iterations,
            max_cost: cfg.batch.max_cost,
            max_price: cfg.max_price_wei()?,
            safety_margin_pct: cfg.batch.safety_margin_pct,
            price_level: cfg.pricing.level,
            call_timeout: cfg.call_timeout(),
        })
    }
}

/// Gas limit for a submission: the estimate plus `margin_pct` percent, floored.
pub fn apply_safety_margin(estimated_cost: u64, margin_pct: Decimal) -> u64 {
    let factor = Decimal::ONE_HUNDRED + margin_pct;
    Decimal::from(estimated_cost)
        .checked_mul(factor)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|v| v.floor().to_u64())
        .unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct SubmissionController {
    ledger: Box<dyn LedgerClient>,
    oracle: PriceOracle,
    /// Address of the signing identity.
    identity: String,
    settings: ControllerSettings,
    state: DrainState,
    cycles: u64,
}

impl SubmissionController {
    pub fn new(
        ledger: Box<dyn LedgerClient>,
        oracle: PriceOracle,
        identity: String,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            ledger,
            oracle,
            identity,
            settings,
            state: DrainState::default(),
            cycles: 0,
        }
    }

    /// Pending-work view produced by the most recent cycle.
    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle and replace the drain state with its result.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        let span = info_span!("cycle", n = self.cycles, id = %Uuid::new_v4());
        let (outcome, state) = self.drive().instrument(span).await;
        self.state = state;
        outcome
    }

    async fn drive(&self) -> (CycleOutcome, DrainState) {
        let timeout = self.settings.call_timeout;
        let ledger = self.ledger.as_ref();

        // CheckPending
        let pending = match bounded(timeout, "pending-work query", ledger.has_pending_work()).await {
            Ok(p) => p,
            Err(e) => {
                return (
                    CycleOutcome::Failed(DrainError::PredicateQuery(format!("{e:#}"))),
                    DrainState::default(),
                )
            }
        };
        if !pending {
            return (CycleOutcome::Idle, DrainState { has_pending_work: false });
        }
        let pending_state = DrainState { has_pending_work: true };

        // Sizing
        let max_cost = self.settings.max_cost;
        let batch = match size_batch(self.settings.default_iterations, max_cost, move |n| {
            bounded(timeout, "cost estimate", ledger.estimate_cost(n, max_cost))
        })
        .await
        {
            Ok(b) => b,
            Err(e) => return (CycleOutcome::Failed(e), pending_state),
        };

        // Pricing
        let quote = match self.oracle.fetch_price(self.settings.price_level).await {
            Ok(q) => q,
            Err(e) => return (CycleOutcome::Failed(e), pending_state),
        };

        // CeilingCheck
        if let Some(ceiling) = self.settings.max_price {
            if quote.amount_wei > ceiling {
                return (
                    CycleOutcome::Skipped(SkipReason::PriceCeilingExceeded {
                        price: quote.amount_wei,
                        ceiling,
                    }),
                    pending_state,
                );
            }
        }

        // Submit
        let cost_limit = apply_safety_margin(batch.estimated_cost, self.settings.safety_margin_pct);
        let sequence_number = match bounded(
            timeout,
            "sequence number fetch",
            ledger.next_sequence_number(&self.identity),
        )
        .await
        {
            Ok(n) => n,
            Err(e) => {
                return (
                    CycleOutcome::Failed(DrainError::SequenceNumber(format!("{e:#}"))),
                    pending_state,
                )
            }
        };

        let request = SubmitRequest {
            iterations: batch.iterations,
            cost_limit,
            price: quote.amount_wei,
            sequence_number,
        };
        info!(
            iterations = request.iterations,
            estimated_cost = batch.estimated_cost,
            cost_limit,
            price_gwei = %format_gwei(request.price),
            nonce = sequence_number,
            "Submitting batch"
        );

        // Bounded by the ledger's own receipt timeout rather than the per-call limit.
        let receipt = match ledger.submit(request).await {
            Ok(r) => r,
            Err(e) => {
                return (
                    CycleOutcome::Failed(DrainError::Submission(format!("{e:#}"))),
                    pending_state,
                )
            }
        };

        // Interpret
        let has_pending_work = match receipt.completion {
            Some(signal) => !signal.finished,
            None => {
                error!(
                    tx_hash = %receipt.tx_hash,
                    "Submission succeeded without a completion signal, assuming more work remains"
                );
                true
            }
        };

        (
            CycleOutcome::Submitted {
                iterations: batch.iterations,
                cost_used: receipt.cost_used,
                price_used: quote.amount_wei,
                continues: has_pending_work,
            },
            DrainState { has_pending_work },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
