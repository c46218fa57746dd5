//! In-memory ledger and price feed for integration testing.
//!
//! Provides deterministic `LedgerClient` and `PriceFeed` implementations
//! whose behaviour is fully controllable from test code and whose calls
//! are recorded for later assertions.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use drainer::gas::PriceFeed;
use drainer::ledger::LedgerClient;
use drainer::types::*;

#[derive(Debug, Default)]
struct LedgerState {
    pending: bool,
    /// Cost charged per iteration by the estimator.
    cost_per_iteration: u64,
    /// Iteration counts above this signal budget-exceeded.
    feasible_up_to: u64,
    /// Completion flag attached to the next receipts; `None` omits the signal.
    completion: Option<bool>,
    /// When set, receipts report `finished` once this many batches landed.
    backlog: Option<usize>,
    nonce: u64,
    fail_pending_check: bool,
    fail_submit: bool,
    pending_checks: usize,
    estimates: Vec<u64>,
    submissions: Vec<SubmitRequest>,
}

/// A deterministic queue contract. Clones share state.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new(pending: bool, cost_per_iteration: u64, feasible_up_to: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                pending,
                cost_per_iteration,
                feasible_up_to,
                completion: Some(true),
                ..Default::default()
            })),
        }
    }

    pub fn set_completion(&self, completion: Option<bool>) {
        self.state.lock().unwrap().completion = completion;
    }

    pub fn set_backlog(&self, batches: usize) {
        self.state.lock().unwrap().backlog = Some(batches);
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().nonce = nonce;
    }

    pub fn fail_pending_check(&self) {
        self.state.lock().unwrap().fail_pending_check = true;
    }

    pub fn fail_submit(&self) {
        self.state.lock().unwrap().fail_submit = true;
    }

    pub fn pending_checks(&self) -> usize {
        self.state.lock().unwrap().pending_checks
    }

    pub fn estimates(&self) -> Vec<u64> {
        self.state.lock().unwrap().estimates.clone()
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state.lock().unwrap().submissions.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn has_pending_work(&self) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        s.pending_checks += 1;
        if s.fail_pending_check {
            return Err(anyhow!("mock ledger unreachable"));
        }
        Ok(s.pending)
    }

    async fn estimate_cost(&self, iterations: u64, _ceiling: u64) -> Result<CostEstimate> {
        let mut s = self.state.lock().unwrap();
        s.estimates.push(iterations);
        if iterations > s.feasible_up_to {
            Ok(CostEstimate::BudgetExceeded)
        } else {
            Ok(CostEstimate::Fits(iterations * s.cost_per_iteration))
        }
    }

    async fn submit(&self, request: SubmitRequest) -> Result<SubmissionReceipt> {
        let mut s = self.state.lock().unwrap();
        if s.fail_submit {
            return Err(anyhow!("mock submission rejected"));
        }
        let cost_used = request.iterations * s.cost_per_iteration;
        s.submissions.push(request);
        s.nonce += 1;
        Ok(SubmissionReceipt {
            tx_hash: format!("0xmock{}", s.submissions.len()),
            cost_used,
            completion: match s.backlog {
                Some(batches) => Some(CompletionSignal {
                    finished: s.submissions.len() >= batches,
                }),
                None => s.completion.map(|finished| CompletionSignal { finished }),
            },
        })
    }

    async fn next_sequence_number(&self, _identity: &str) -> Result<u64> {
        Ok(self.state.lock().unwrap().nonce)
    }
}

/// A price feed returning fixed levels, or failing, and counting calls.
#[derive(Clone)]
pub struct MockFeed {
    name: &'static str,
    levels: Option<GasLevels>,
    calls: Arc<Mutex<usize>>,
}

impl MockFeed {
    /// A feed whose above-standard level equals `price`.
    pub fn at(name: &'static str, price: u64) -> Self {
        Self {
            name,
            levels: Some(GasLevels {
                safe_low: price,
                standard: price,
                fast: price,
                fastest: price,
            }),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            levels: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PriceFeed for MockFeed {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_levels(&self) -> Result<GasLevels> {
        *self.calls.lock().unwrap() += 1;
        self.levels.ok_or_else(|| anyhow!("{} unavailable", self.name))
    }
}
