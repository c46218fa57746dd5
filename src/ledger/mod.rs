//! Remote ledger integration.
//!
//! Defines the `LedgerClient` trait the submission controller drives and
//! provides an `alloy` provider implementation against an Ethereum-style node.

pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{CostEstimate, SubmissionReceipt, SubmitRequest};

/// Abstraction over the deployed queue contract.
///
/// Every method is a single remote round-trip (submission includes
/// waiting for the receipt). Implementors never retry internally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether queued work is waiting to be processed.
    async fn has_pending_work(&self) -> Result<bool>;

    /// Estimate the cost of processing `iterations` under `ceiling`.
    ///
    /// Returns `CostEstimate::BudgetExceeded` when the remote side reports
    /// that the work would not fit, and `Err` only for genuine failures.
    async fn estimate_cost(&self, iterations: u64, ceiling: u64) -> Result<CostEstimate>;

    /// Submit one batch and wait for its outcome.
    async fn submit(&self, request: SubmitRequest) -> Result<SubmissionReceipt>;

    /// Next sequence number (nonce) for the signing identity.
    async fn next_sequence_number(&self, identity: &str) -> Result<u64>;
}
