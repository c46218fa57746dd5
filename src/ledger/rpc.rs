//! JSON-RPC ledger client.
//!
//! Drives the queue contract through an `alloy` HTTP provider. Submissions
//! go out as `eth_sendTransaction`, so the node's managed account signs them
//! and no key material ever reaches this process.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::eth::{Log, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use alloy::transports::http::{Client, Http};
use alloy::transports::TransportError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::LedgerClient;
use crate::config::LedgerConfig;
use crate::types::{CompletionSignal, CostEstimate, SubmissionReceipt, SubmitRequest};

alloy::sol! {
    interface IWorkQueue {
        function hasPendingWork() external view returns (bool pending);
        function process(uint256 iterations) external;

        event WorkProcessed(bool finished);
    }
}

/// Node error fragments meaning the requested work does not fit the gas cap.
const GAS_EXHAUSTION_MARKERS: &[&str] = &[
    "gas required exceeds",
    "out of gas",
    "exceeds block gas limit",
];

pub struct RpcLedger {
    provider: RootProvider<Http<Client>>,
    contract: Address,
    sender: Address,
    receipt_timeout: Duration,
}

impl RpcLedger {
    pub fn new(cfg: &LedgerConfig) -> Result<Self> {
        let url: Url = cfg
            .rpc_url
            .parse()
            .with_context(|| format!("Invalid ledger.rpc_url: {}", cfg.rpc_url))?;
        let contract = cfg
            .contract_address
            .parse::<Address>()
            .with_context(|| format!("Invalid ledger.contract_address: {}", cfg.contract_address))?;
        let sender = cfg
            .sender_address
            .parse::<Address>()
            .with_context(|| format!("Invalid ledger.sender_address: {}", cfg.sender_address))?;

        Ok(Self {
            provider: ProviderBuilder::new().on_http(url),
            contract,
            sender,
            receipt_timeout: Duration::from_millis(cfg.receipt_timeout_ms),
        })
    }

    /// Confirm that code is deployed at the configured contract address.
    ///
    /// Called once at startup, before the poll loop begins.
    pub async fn verify_contract(&self) -> Result<()> {
        let code = self
            .provider
            .get_code_at(self.contract)
            .await
            .context("eth_getCode failed")?;
        if code.is_empty() {
            anyhow::bail!("No contract deployed at {}", self.contract);
        }
        info!(
            contract = %self.contract,
            code_bytes = code.len(),
            "Queue contract verified"
        );
        Ok(())
    }

    /// `process(iterations)` from the sender to the queue contract.
    fn process_request(&self, iterations: u64) -> TransactionRequest {
        let call = IWorkQueue::processCall {
            iterations: U256::from(iterations),
        };
        TransactionRequest::default()
            .with_from(self.sender)
            .with_to(self.contract)
            .with_input(call.abi_encode())
    }
}

fn is_gas_exhaustion(message: &str) -> bool {
    let lower = message.to_lowercase();
    GAS_EXHAUSTION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Whether the node rejected an estimate because the work exceeds the gas cap.
fn is_budget_error(err: &TransportError) -> bool {
    err.as_error_resp()
        .is_some_and(|payload| is_gas_exhaustion(&payload.message))
}

/// Interpret a gas estimate relative to the caller's ceiling.
fn classify_estimate(gas: u64, ceiling: u64) -> CostEstimate {
    if gas > ceiling {
        CostEstimate::BudgetExceeded
    } else {
        CostEstimate::Fits(gas)
    }
}

/// Turn a mined receipt into a submission outcome.
///
/// A reverted transaction is an error. A missing or undecodable
/// `WorkProcessed` log from the queue contract yields `completion: None`.
fn interpret_receipt(
    tx_hash: B256,
    succeeded: bool,
    gas_used: u64,
    logs: &[Log],
    contract: Address,
) -> Result<SubmissionReceipt> {
    if !succeeded {
        anyhow::bail!("Transaction {tx_hash:#x} reverted");
    }

    let completion = logs
        .iter()
        .find(|log| {
            log.address() == contract
                && log.topic0() == Some(&IWorkQueue::WorkProcessed::SIGNATURE_HASH)
        })
        .and_then(|log| match log.log_decode::<IWorkQueue::WorkProcessed>() {
            Ok(decoded) => Some(CompletionSignal {
                finished: decoded.inner.data.finished,
            }),
            Err(e) => {
                warn!(error = %e, "Undecodable completion log");
                None
            }
        });

    Ok(SubmissionReceipt {
        tx_hash: format!("{tx_hash:#x}"),
        cost_used: gas_used,
        completion,
    })
}

// ---------------------------------------------------------------------------
// LedgerClient implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn has_pending_work(&self) -> Result<bool> {
        let request = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(IWorkQueue::hasPendingWorkCall {}.abi_encode());
        let raw = self
            .provider
            .call(&request)
            .await
            .context("eth_call for pending work failed")?;
        let decoded = IWorkQueue::hasPendingWorkCall::abi_decode_returns(raw.as_ref(), true)
            .context("Malformed hasPendingWork return data")?;
        Ok(decoded.pending)
    }

    async fn estimate_cost(&self, iterations: u64, ceiling: u64) -> Result<CostEstimate> {
        let request = self.process_request(iterations).with_gas_limit(ceiling);

        match self.provider.estimate_gas(&request).await {
            Ok(gas) => Ok(classify_estimate(gas, ceiling)),
            Err(e) if is_budget_error(&e) => {
                debug!(iterations, ceiling, error = %e, "Estimate exceeds gas ceiling");
                Ok(CostEstimate::BudgetExceeded)
            }
            Err(e) => Err(e).context("eth_estimateGas failed"),
        }
    }

    async fn submit(&self, request: SubmitRequest) -> Result<SubmissionReceipt> {
        let tx = self
            .process_request(request.iterations)
            .with_gas_limit(request.cost_limit)
            .with_gas_price(u128::from(request.price))
            .with_nonce(request.sequence_number);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .context("eth_sendTransaction failed")?;
        let tx_hash = *pending.tx_hash();

        info!(
            tx_hash = %format!("{tx_hash:#x}"),
            iterations = request.iterations,
            nonce = request.sequence_number,
            "Submission broadcast, awaiting receipt"
        );

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .with_context(|| {
                format!(
                    "Transaction {tx_hash:#x} not mined within {}ms",
                    self.receipt_timeout.as_millis()
                )
            })?;

        interpret_receipt(
            receipt.transaction_hash,
            receipt.status(),
            u64::try_from(receipt.gas_used).context("Receipt gas_used exceeds u64")?,
            receipt.inner.logs(),
            self.contract,
        )
    }

    async fn next_sequence_number(&self, identity: &str) -> Result<u64> {
        let address = identity
            .parse::<Address>()
            .with_context(|| format!("Invalid signing identity: {identity}"))?;
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .context("eth_getTransactionCount failed")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
