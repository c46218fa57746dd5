use rust_decimal_macros::dec;
use std::time::Duration;

use drainer::engine::controller::{ControllerSettings, SubmissionController};
use drainer::engine::driver::Driver;
use drainer::engine::oracle::PriceOracle;
use drainer::types::*;

use crate::mock_ledger::{MockFeed, MockLedger};

const GWEI: u64 = 1_000_000_000;
const SENDER: &str = "0x00000000000000000000000000000000000000aa";

fn settings(max_price: Option<u64>) -> ControllerSettings {
    ControllerSettings {
        default_iterations: 100,
        max_cost: 1_000_000,
        max_price,
        safety_margin_pct: dec!(10),
        price_level: ServiceLevel::AboveStandard,
        call_timeout: Some(Duration::from_secs(5)),
    }
}

fn controller(
    ledger: &MockLedger,
    primary: &MockFeed,
    fallback: Option<&MockFeed>,
    max_price: Option<u64>,
) -> SubmissionController {
    let oracle = PriceOracle::new(
        Box::new(primary.clone()),
        fallback.map(|f| Box::new(f.clone()) as Box<dyn drainer::gas::PriceFeed>),
    );
    SubmissionController::new(
        Box::new(ledger.clone()),
        oracle,
        SENDER.to_string(),
        settings(max_price),
    )
}

// ---------------------------------------------------------------------------
// Single cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_queue_touches_nothing_else() {
    let ledger = MockLedger::new(false, 5_000, 100);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Idle));
    assert_eq!(primary.calls(), 0);
    assert!(ledger.estimates().is_empty());
    assert!(ledger.submissions().is_empty());
    assert!(!ctl.state().has_pending_work);
}

#[tokio::test]
async fn full_batch_submitted_with_margin_price_and_nonce() {
    let ledger = MockLedger::new(true, 5_000, 100);
    ledger.set_nonce(42);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, Some(150 * GWEI));

    let outcome = ctl.run_cycle().await;

    match outcome {
        CycleOutcome::Submitted { iterations, cost_used, price_used, continues } => {
            assert_eq!(iterations, 100);
            assert_eq!(cost_used, 500_000);
            assert_eq!(price_used, 20 * GWEI);
            assert!(!continues);
        }
        other => panic!("expected submission, got {other:?}"),
    }
    assert_eq!(
        ledger.submissions(),
        vec![SubmitRequest {
            iterations: 100,
            cost_limit: 550_000,
            price: 20 * GWEI,
            sequence_number: 42,
        }]
    );
    assert_eq!(ledger.estimates(), vec![100]);
}

#[tokio::test]
async fn finished_queue_is_requeried_next_cycle() {
    let ledger = MockLedger::new(true, 5_000, 100);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    ctl.run_cycle().await;
    ctl.run_cycle().await;

    assert_eq!(ledger.pending_checks(), 2);
    assert_eq!(ledger.submissions().len(), 2);
    assert_eq!(ctl.cycles(), 2);
}

#[tokio::test]
async fn price_above_ceiling_skips_submission() {
    let ledger = MockLedger::new(true, 5_000, 100);
    let primary = MockFeed::at("primary", 200 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, Some(150 * GWEI));

    let outcome = ctl.run_cycle().await;

    match outcome {
        CycleOutcome::Skipped(SkipReason::PriceCeilingExceeded { price, ceiling }) => {
            assert_eq!(price, 200 * GWEI);
            assert_eq!(ceiling, 150 * GWEI);
        }
        other => panic!("expected skip, got {other:?}"),
    }
    assert_eq!(ledger.estimates(), vec![100]);
    assert!(ledger.submissions().is_empty());
    assert!(ctl.state().has_pending_work);
}

#[tokio::test]
async fn oversized_batch_halves_until_it_fits() {
    let ledger = MockLedger::new(true, 5_000, 60);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Submitted { iterations: 50, .. }));
    assert_eq!(ledger.estimates(), vec![100, 50]);
    let submitted = ledger.submissions();
    assert_eq!(submitted[0].iterations, 50);
    assert_eq!(submitted[0].cost_limit, 275_000);
}

#[tokio::test]
async fn unsizable_batch_fails_without_submitting() {
    let ledger = MockLedger::new(true, 5_000, 0);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Failed(DrainError::BatchUnsizable { start_iterations: 100, .. })
    ));
    assert_eq!(primary.calls(), 0);
    assert_eq!(ledger.estimates(), vec![100, 50, 25, 12, 6, 3, 1]);
    assert!(ledger.submissions().is_empty());
}

// ---------------------------------------------------------------------------
// Price fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn primary_outage_falls_back_once() {
    let ledger = MockLedger::new(true, 5_000, 100);
    let primary = MockFeed::failing("primary");
    let fallback = MockFeed::at("fallback", 31 * GWEI);
    let mut ctl = controller(&ledger, &primary, Some(&fallback), None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Submitted { price_used, .. } if price_used == 31 * GWEI));
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(ledger.submissions()[0].price, 31 * GWEI);
}

#[tokio::test]
async fn healthy_primary_never_touches_fallback() {
    let ledger = MockLedger::new(true, 5_000, 100);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let fallback = MockFeed::at("fallback", 31 * GWEI);
    let mut ctl = controller(&ledger, &primary, Some(&fallback), None);

    ctl.run_cycle().await;

    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn both_feeds_down_fails_cycle() {
    let ledger = MockLedger::new(true, 5_000, 100);
    let primary = MockFeed::failing("primary");
    let fallback = MockFeed::failing("fallback");
    let mut ctl = controller(&ledger, &primary, Some(&fallback), None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Failed(DrainError::PriceFetchFailed { .. })));
    assert!(ledger.submissions().is_empty());
    assert!(ctl.state().has_pending_work);
}

// ---------------------------------------------------------------------------
// Failures and completion signal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_completion_signal_assumes_more_work() {
    let ledger = MockLedger::new(true, 5_000, 100);
    ledger.set_completion(None);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Submitted { continues: true, .. }));
}

#[tokio::test]
async fn unreachable_ledger_fails_cycle() {
    let ledger = MockLedger::new(true, 5_000, 100);
    ledger.fail_pending_check();
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Failed(DrainError::PredicateQuery(_))));
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn rejected_submission_fails_cycle() {
    let ledger = MockLedger::new(true, 5_000, 100);
    ledger.fail_submit();
    let primary = MockFeed::at("primary", 20 * GWEI);
    let mut ctl = controller(&ledger, &primary, None, None);

    let outcome = ctl.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Failed(DrainError::Submission(_))));
    assert!(ctl.state().has_pending_work);
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn driver_drains_backlog_back_to_back() {
    let ledger = MockLedger::new(true, 5_000, 100);
    ledger.set_backlog(3);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let ctl = controller(&ledger, &primary, None, None);

    // With an hour-long poll interval, all three batches inside the window
    // must have been started without sleeping.
    let driver = Driver::new(ctl, Duration::from_secs(3600));
    driver
        .run(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    let submitted = ledger.submissions();
    assert_eq!(submitted.len(), 3);
    for (i, req) in submitted.iter().enumerate() {
        assert_eq!(req.sequence_number, i as u64);
    }
}

#[tokio::test]
async fn driver_idles_on_empty_queue_until_shutdown() {
    let ledger = MockLedger::new(false, 5_000, 100);
    let primary = MockFeed::at("primary", 20 * GWEI);
    let ctl = controller(&ledger, &primary, None, None);

    let driver = Driver::new(ctl, Duration::from_secs(3600));
    driver
        .run(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    assert_eq!(ledger.pending_checks(), 1);
    assert_eq!(primary.calls(), 0);
}
