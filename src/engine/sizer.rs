//! Batch sizer.
//!
//! Finds the largest batch the remote estimator accepts under the cost
//! ceiling by halving from a starting iteration count. The remote side only
//! answers "fits" or "exceeded", never a margin, so halving bounds the probe
//! count at O(log start).

use anyhow::Result;
use std::future::Future;
use tracing::{debug, warn};

use crate::types::{BudgetedBatch, CostEstimate, DrainError};

/// Size a batch against `estimate`, starting at `start_iterations`.
///
/// - `Fits(cost)` within `max_cost` returns immediately.
/// - `BudgetExceeded` halves the iteration count and probes again.
/// - Any estimation error is returned as-is, without halving.
/// - Halving down to zero yields `BatchUnsizable`.
pub async fn size_batch<F, Fut>(
    start_iterations: u64,
    max_cost: u64,
    mut estimate: F,
) -> Result<BudgetedBatch, DrainError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<CostEstimate>>,
{
    if start_iterations == 0 {
        return Err(DrainError::Config("start iterations must be at least 1".into()));
    }
    if max_cost == 0 {
        return Err(DrainError::Config("max cost must be positive".into()));
    }

    let mut iterations = start_iterations;
    let mut probes = 0u32;

    while iterations > 0 {
        probes += 1;
        match estimate(iterations).await {
            Ok(CostEstimate::Fits(cost)) if cost <= max_cost => {
                debug!(iterations, cost, probes, "Batch sized");
                return Ok(BudgetedBatch {
                    iterations,
                    estimated_cost: cost,
                });
            }
            Ok(CostEstimate::Fits(cost)) => {
                warn!(iterations, cost, max_cost, "Estimate above ceiling, treating as exceeded");
            }
            Ok(CostEstimate::BudgetExceeded) => {
                debug!(iterations, max_cost, "Budget exceeded, halving");
            }
            Err(e) => {
                return Err(DrainError::Estimation {
                    iterations,
                    message: format!("{e:#}"),
                });
            }
        }
        iterations /= 2;
    }

    Err(DrainError::BatchUnsizable {
        start_iterations,
        max_cost,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
