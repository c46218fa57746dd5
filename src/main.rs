//! DRAINER: adaptive batch-submission daemon
//!
//! Entry point. Loads configuration, initialises structured logging,
//! verifies the target contract, and runs the check→size→price→submit
//! loop until Ctrl+C.

use anyhow::{Context, Result};
use tracing::info;

use drainer::config::{self, AppConfig};
use drainer::engine::controller::{ControllerSettings, SubmissionController};
use drainer::engine::driver::Driver;
use drainer::engine::oracle::PriceOracle;
use drainer::ledger::rpc::RpcLedger;
use drainer::types::format_gwei;

const BANNER: &str = r#"
 ____  ____      _    ___ _   _ _____ ____
|  _ \|  _ \    / \  |_ _| \ | | ____|  _ \
| | | | |_) |  / _ \  | ||  \| |  _| | |_) |
| |_| |  _ <  / ___ \ | || |\  | |___|  _ <
|____/|_| \_\/_/   \_\___|_| \_|_____|_| \_\

  Adaptive batch-submission daemon
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("DRAINER_CONFIG").unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    let max_price = cfg.max_price_wei()?;
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_ms = cfg.agent.poll_interval_ms,
        default_iterations = cfg.batch.default_iterations,
        max_cost = cfg.batch.max_cost,
        max_price_gwei = %max_price.map(format_gwei).unwrap_or_else(|| "none".into()),
        primary_feed = ?cfg.pricing.primary,
        fallback_feed = ?cfg.pricing.fallback,
        "DRAINER starting up"
    );

    // -- Initialise components -------------------------------------------

    let oracle = PriceOracle::from_config(&cfg.pricing)?.with_call_timeout(cfg.call_timeout());

    let ledger = RpcLedger::new(&cfg.ledger)?;
    ledger
        .verify_contract()
        .await
        .context("Target contract check failed")?;

    let settings = ControllerSettings::from_config(&cfg)?;
    let controller = SubmissionController::new(
        Box::new(ledger),
        oracle,
        cfg.ledger.sender_address.clone(),
        settings,
    );

    // -- Main loop -------------------------------------------------------

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    Driver::new(controller, cfg.poll_interval()).run(shutdown).await?;

    info!("DRAINER shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("drainer=info"));

    let json_logging = std::env::var("DRAINER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
