//! Poll loop driver.
//!
//! Owns the process lifetime: runs cycles back to back while work remains,
//! sleeps the poll interval otherwise, and stops only on the shutdown
//! signal or when a panic escapes the controller.

use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, info};

use super::controller::SubmissionController;
use crate::types::{format_gwei, CycleOutcome};

/// Delay before the next cycle, or `None` to start it immediately.
pub fn next_delay(outcome: &CycleOutcome, poll_interval: Duration) -> Option<Duration> {
    match outcome {
        CycleOutcome::Submitted { continues: true, .. } => None,
        CycleOutcome::Submitted { continues: false, .. }
        | CycleOutcome::Idle
        | CycleOutcome::Skipped(_)
        | CycleOutcome::Failed(_) => Some(poll_interval),
    }
}

pub struct Driver {
    controller: SubmissionController,
    poll_interval: Duration,
}

impl Driver {
    pub fn new(controller: SubmissionController, poll_interval: Duration) -> Self {
        Self {
            controller,
            poll_interval,
        }
    }

    /// Loop until `shutdown` resolves (returns `Ok`) or a cycle panics
    /// (returns `Err`). An in-flight cycle is abandoned on shutdown.
    pub async fn run<S>(mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Entering drain loop. Press Ctrl+C to stop."
        );

        loop {
            let outcome = tokio::select! {
                result = AssertUnwindSafe(self.controller.run_cycle()).catch_unwind() => match result {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let msg = panic_message(panic.as_ref());
                        error!(panic = %msg, "Submission controller panicked");
                        anyhow::bail!("Submission controller panicked: {msg}");
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received mid-cycle.");
                    return Ok(());
                }
            };

            log_outcome(&outcome);

            if let Some(delay) = next_delay(&outcome, self.poll_interval) {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut shutdown => {
                        info!("Shutdown signal received.");
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One structured line per cycle outcome.
fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Idle => info!(outcome = outcome.label(), "No pending work"),
        CycleOutcome::Skipped(reason) => {
            info!(outcome = outcome.label(), %reason, "Cycle skipped")
        }
        CycleOutcome::Submitted {
            iterations,
            cost_used,
            price_used,
            continues,
        } => info!(
            outcome = outcome.label(),
            iterations,
            cost_used,
            price_gwei = %format_gwei(*price_used),
            continues,
            "Cycle complete"
        ),
        CycleOutcome::Failed(e) => error!(
            outcome = outcome.label(),
            error = %e,
            detail = ?e,
            "Cycle failed, retrying after poll interval"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
