//! Wallet gateway adapter trait and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::order::Currency;
use domain::{Money, WalletFailureKind, WalletType};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// A charge sent to a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletChargeRequest {
    pub wallet_type: WalletType,
    pub wallet_phone: String,
    pub amount: Money,
    pub currency: Currency,
    /// Fresh per attempt; the gateway charges at most once per reference.
    pub transaction_reference: String,
}

/// An approved charge.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletChargeReceipt {
    /// The provider's own transaction ID.
    pub wallet_transaction_id: String,
    pub fees: Money,
    pub response_payload: serde_json::Value,
}

/// Why a charge did not go through.
///
/// The three cases are kept apart so the payment's failure reason says
/// whether the customer was declined or the gateway misbehaved.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider refused the charge.
    #[error("{0}")]
    Declined(String),

    /// The gateway could not be reached or answered with an error.
    #[error("{0}")]
    Unavailable(String),

    /// No answer in time.
    #[error("no response after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl GatewayError {
    pub fn failure_kind(&self) -> WalletFailureKind {
        match self {
            GatewayError::Declined(_) => WalletFailureKind::Declined,
            GatewayError::Unavailable(_) => WalletFailureKind::GatewayError,
            GatewayError::Timeout(_) => WalletFailureKind::Timeout,
        }
    }

    /// Label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::Declined(_) => "declined",
            GatewayError::Unavailable(_) => "error",
            GatewayError::Timeout(_) => "timeout",
        }
    }
}

/// The out-of-process wallet provider.
///
/// Implementations must charge at most once per `transaction_reference`:
/// repeating a reference returns the outcome of the first charge.
#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn charge(
        &self,
        request: WalletChargeRequest,
    ) -> Result<WalletChargeReceipt, GatewayError>;
}

/// What the in-memory gateway does with a charge.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// Approve with no fees.
    Approve,
    /// Approve and report fees.
    ApproveWithFees(Money),
    /// Refuse the charge.
    Decline(String),
    /// Answer with a gateway error.
    Fail(String),
    /// Never answer.
    Hang,
}

#[derive(Debug)]
struct GatewayState {
    script: VecDeque<ScriptedOutcome>,
    default_outcome: ScriptedOutcome,
    calls: Vec<WalletChargeRequest>,
    receipts: HashMap<String, WalletChargeReceipt>,
    next_id: u64,
}

/// In-memory wallet gateway for tests and local runs.
///
/// Outcomes are taken from a script in order, then from the default
/// outcome. Every call is recorded.
#[derive(Debug, Clone)]
pub struct InMemoryWalletGateway {
    state: Arc<Mutex<GatewayState>>,
    latency: Duration,
}

impl Default for InMemoryWalletGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWalletGateway {
    /// Creates a gateway that approves every charge immediately.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GatewayState {
                script: VecDeque::new(),
                default_outcome: ScriptedOutcome::Approve,
                calls: Vec::new(),
                receipts: HashMap::new(),
                next_id: 0,
            })),
            latency: Duration::ZERO,
        }
    }

    /// Delays every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the outcome used once the script runs out.
    pub async fn set_default_outcome(&self, outcome: ScriptedOutcome) {
        self.state.lock().await.default_outcome = outcome;
    }

    /// Queues an outcome for the next new charge.
    pub async fn push_outcome(&self, outcome: ScriptedOutcome) {
        self.state.lock().await.script.push_back(outcome);
    }

    /// Returns every charge request received, repeats included.
    pub async fn calls(&self) -> Vec<WalletChargeRequest> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Returns the number of distinct approved charges.
    pub async fn charge_count(&self) -> usize {
        self.state.lock().await.receipts.len()
    }
}

#[async_trait]
impl WalletGateway for InMemoryWalletGateway {
    async fn charge(
        &self,
        request: WalletChargeRequest,
    ) -> Result<WalletChargeReceipt, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock().await;
        state.calls.push(request.clone());

        if let Some(receipt) = state.receipts.get(&request.transaction_reference) {
            return Ok(receipt.clone());
        }

        let outcome = state
            .script
            .pop_front()
            .unwrap_or_else(|| state.default_outcome.clone());

        let fees = match outcome {
            ScriptedOutcome::Approve => Money::zero(),
            ScriptedOutcome::ApproveWithFees(fees) => fees,
            ScriptedOutcome::Decline(message) => return Err(GatewayError::Declined(message)),
            ScriptedOutcome::Fail(message) => return Err(GatewayError::Unavailable(message)),
            ScriptedOutcome::Hang => {
                drop(state);
                return std::future::pending().await;
            }
        };

        state.next_id += 1;
        let wallet_transaction_id = format!("{}-{:08}", request.wallet_type.as_str(), state.next_id);
        let receipt = WalletChargeReceipt {
            wallet_transaction_id: wallet_transaction_id.clone(),
            fees,
            response_payload: serde_json::json!({
                "status": "APPROVED",
                "walletTransactionId": wallet_transaction_id,
                "reference": request.transaction_reference,
                "amount": request.amount,
                "fees": fees,
            }),
        };
        state
            .receipts
            .insert(request.transaction_reference.clone(), receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(reference: &str) -> WalletChargeRequest {
        WalletChargeRequest {
            wallet_type: WalletType::WalletA,
            wallet_phone: "770000000".to_string(),
            amount: Money::from_minor(25500),
            currency: Currency::default(),
            transaction_reference: reference.to_string(),
        }
    }

    #[tokio::test]
    async fn test_approves_by_default() {
        let gateway = InMemoryWalletGateway::new();

        let receipt = gateway.charge(request("WR-1")).await.unwrap();

        assert_eq!(receipt.wallet_transaction_id, "WALLET_A-00000001");
        assert_eq!(receipt.fees, Money::zero());
        assert_eq!(receipt.response_payload["status"], "APPROVED");
        assert_eq!(gateway.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_reference_returns_original_receipt() {
        let gateway = InMemoryWalletGateway::new();
        gateway
            .push_outcome(ScriptedOutcome::ApproveWithFees(Money::from_minor(150)))
            .await;

        let first = gateway.charge(request("WR-1")).await.unwrap();
        let second = gateway.charge(request("WR-1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.fees, Money::from_minor(150));
        assert_eq!(gateway.call_count().await, 2);
        assert_eq!(gateway.charge_count().await, 1);
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let gateway = InMemoryWalletGateway::new();
        gateway
            .push_outcome(ScriptedOutcome::Decline("insufficient balance".to_string()))
            .await;
        gateway
            .set_default_outcome(ScriptedOutcome::Fail("provider down".to_string()))
            .await;

        let declined = gateway.charge(request("WR-1")).await.unwrap_err();
        let failed = gateway.charge(request("WR-2")).await.unwrap_err();

        assert_eq!(declined.failure_kind(), WalletFailureKind::Declined);
        assert_eq!(declined.to_string(), "insufficient balance");
        assert_eq!(failed.failure_kind(), WalletFailureKind::GatewayError);
        assert_eq!(gateway.charge_count().await, 0);
    }

    #[tokio::test]
    async fn test_hang_never_answers() {
        let gateway = InMemoryWalletGateway::new();
        gateway.push_outcome(ScriptedOutcome::Hang).await;

        let result =
            tokio::time::timeout(Duration::from_millis(20), gateway.charge(request("WR-1"))).await;

        assert!(result.is_err());
        assert_eq!(gateway.call_count().await, 1);
    }

    #[test]
    fn test_timeout_message() {
        let err = GatewayError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "no response after 1500ms");
        assert_eq!(err.failure_kind(), WalletFailureKind::Timeout);
        assert_eq!(
            err.failure_kind().payment_reason(&err.to_string()),
            "wallet gateway timeout: no response after 1500ms"
        );
    }
}
