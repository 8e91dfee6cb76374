//! Wallet transaction: the gateway-processed leg of an e-wallet payment.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use store::{RecordKey, Version};

use crate::aggregate::Aggregate;
use crate::money::Money;

use super::{
    OpenWalletTransaction, PaymentError, PaymentStatus, WalletEvent, WalletType,
    events::WalletTransactionOpenedData,
};

/// Record key names for wallet transactions.
pub mod keys {
    pub const DISPLAY_ID: &str = "display_id";
    pub const TRANSACTION_REFERENCE: &str = "transaction_reference";
    pub const PAYMENT_ID: &str = "payment_id";
    pub const STATUS: &str = "status";
}

/// Why a wallet charge did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletFailureKind {
    /// The provider refused the charge.
    Declined,
    /// The gateway could not be reached or answered with an error.
    GatewayError,
    /// No answer within the time limit.
    Timeout,
}

impl WalletFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletFailureKind::Declined => "DECLINED",
            WalletFailureKind::GatewayError => "GATEWAY_ERROR",
            WalletFailureKind::Timeout => "TIMEOUT",
        }
    }

    /// Failure reason recorded on the owning payment.
    pub fn payment_reason(&self, message: &str) -> String {
        match self {
            WalletFailureKind::Declined => format!("wallet payment declined: {message}"),
            WalletFailureKind::GatewayError => format!("wallet gateway error: {message}"),
            WalletFailureKind::Timeout => format!("wallet gateway timeout: {message}"),
        }
    }
}

impl std::fmt::Display for WalletFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The wallet leg of one e-wallet payment attempt.
///
/// Once terminal it is never reopened; a retry uses a new payment with a new
/// wallet transaction and a fresh reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletTransaction {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    display_id: String,
    transaction_reference: String,
    wallet_transaction_id: Option<String>,
    payment_id: Option<AggregateId>,
    wallet_type: WalletType,
    wallet_phone: String,
    amount: Money,
    fees: Money,
    status: PaymentStatus,
    request_payload: Option<serde_json::Value>,
    response_payload: Option<serde_json::Value>,
    error_message: Option<String>,
    failure_kind: Option<WalletFailureKind>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Aggregate for WalletTransaction {
    type Event = WalletEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "WalletTransaction"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            WalletEvent::WalletTransactionOpened(data) => self.apply_opened(*data),
            WalletEvent::WalletProcessingStarted {
                request_payload,
                started_at,
            } => {
                self.status = PaymentStatus::Processing;
                self.request_payload = Some(request_payload);
                self.updated_at = Some(started_at);
            }
            WalletEvent::WalletTransactionCompleted {
                wallet_transaction_id,
                fees,
                response_payload,
                completed_at,
            } => {
                self.status = PaymentStatus::Completed;
                self.wallet_transaction_id = Some(wallet_transaction_id);
                self.fees = fees;
                self.response_payload = Some(response_payload);
                self.completed_at = Some(completed_at);
                self.updated_at = Some(completed_at);
            }
            WalletEvent::WalletTransactionFailed {
                kind,
                message,
                response_payload,
                failed_at,
            } => {
                self.status = PaymentStatus::Failed;
                self.failure_kind = Some(kind);
                self.error_message = Some(message);
                if response_payload.is_some() {
                    self.response_payload = response_payload;
                }
                self.completed_at = Some(failed_at);
                self.updated_at = Some(failed_at);
            }
        }
    }

    fn keys(&self) -> Vec<RecordKey> {
        let mut keys = vec![
            RecordKey::unique(keys::DISPLAY_ID, self.display_id.clone()),
            RecordKey::unique(
                keys::TRANSACTION_REFERENCE,
                self.transaction_reference.clone(),
            ),
            RecordKey::lookup(keys::STATUS, self.status.as_str()),
        ];
        if let Some(payment_id) = self.payment_id {
            keys.push(RecordKey::unique(keys::PAYMENT_ID, payment_id.to_string()));
        }
        keys
    }
}

impl WalletTransaction {
    fn apply_opened(&mut self, data: WalletTransactionOpenedData) {
        self.id = Some(data.wallet_id);
        self.display_id = data.display_id;
        self.transaction_reference = data.transaction_reference;
        self.payment_id = Some(data.payment_id);
        self.wallet_type = data.wallet_type;
        self.wallet_phone = data.wallet_phone;
        self.amount = data.amount;
        self.fees = Money::zero();
        self.status = PaymentStatus::Pending;
        self.created_at = Some(data.opened_at);
        self.updated_at = Some(data.opened_at);
    }

    fn invalid_transition(&self, action: &'static str) -> PaymentError {
        PaymentError::InvalidStateTransition {
            aggregate: "wallet transaction",
            current_state: self.status,
            action,
        }
    }
}

// Query methods
impl WalletTransaction {
    pub fn display_id(&self) -> &str {
        &self.display_id
    }

    /// Returns the locally generated reference sent to the gateway.
    pub fn transaction_reference(&self) -> &str {
        &self.transaction_reference
    }

    /// Returns the gateway's own ID for the charge, once approved.
    pub fn wallet_transaction_id(&self) -> Option<&str> {
        self.wallet_transaction_id.as_deref()
    }

    pub fn payment_id(&self) -> Option<AggregateId> {
        self.payment_id
    }

    pub fn wallet_type(&self) -> WalletType {
        self.wallet_type
    }

    pub fn wallet_phone(&self) -> &str {
        &self.wallet_phone
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn fees(&self) -> Money {
        self.fees
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn request_payload(&self) -> Option<&serde_json::Value> {
        self.request_payload.as_ref()
    }

    pub fn response_payload(&self) -> Option<&serde_json::Value> {
        self.response_payload.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn failure_kind(&self) -> Option<WalletFailureKind> {
        self.failure_kind
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns true once the gateway outcome is recorded.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Failure reason for the owning payment, if this leg failed.
    pub fn payment_failure_reason(&self) -> Option<String> {
        let kind = self.failure_kind?;
        Some(kind.payment_reason(self.error_message.as_deref().unwrap_or("no details")))
    }
}

// Command methods (return events)
impl WalletTransaction {
    /// Opens the wallet leg in `PENDING`.
    ///
    /// The phone must fit the wallet's numbering plan and the amount must
    /// equal the owning payment's.
    pub fn open(&self, cmd: OpenWalletTransaction) -> Result<Vec<WalletEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::AlreadyCreated);
        }
        let wallet_type = cmd
            .payment_method
            .wallet_type()
            .ok_or(PaymentError::NotAWalletMethod(cmd.payment_method))?;
        let wallet_phone = wallet_type.validate_phone(&cmd.wallet_phone)?;
        if !cmd.amount.is_positive() {
            return Err(PaymentError::InvalidAmount(cmd.amount));
        }
        if cmd.amount != cmd.payment_amount {
            return Err(PaymentError::AmountMismatch {
                expected: cmd.payment_amount,
                found: cmd.amount,
            });
        }

        Ok(vec![WalletEvent::WalletTransactionOpened(Box::new(
            WalletTransactionOpenedData {
                wallet_id: cmd.wallet_id,
                display_id: cmd.display_id,
                transaction_reference: cmd.transaction_reference,
                payment_id: cmd.payment_id,
                wallet_type,
                wallet_phone,
                amount: cmd.amount,
                opened_at: Utc::now(),
            },
        ))])
    }

    /// Records the charge request about to be sent.
    pub fn start_processing(
        &self,
        request_payload: serde_json::Value,
    ) -> Result<Vec<WalletEvent>, PaymentError> {
        if !self.status.can_start_processing() {
            return Err(self.invalid_transition("start processing"));
        }
        Ok(vec![WalletEvent::WalletProcessingStarted {
            request_payload,
            started_at: Utc::now(),
        }])
    }

    /// Records an approved charge.
    pub fn complete(
        &self,
        wallet_transaction_id: String,
        fees: Money,
        response_payload: serde_json::Value,
    ) -> Result<Vec<WalletEvent>, PaymentError> {
        if !self.status.can_settle() {
            return Err(self.invalid_transition("complete"));
        }
        Ok(vec![WalletEvent::WalletTransactionCompleted {
            wallet_transaction_id,
            fees,
            response_payload,
            completed_at: Utc::now(),
        }])
    }

    /// Records a declined, failed, or timed-out charge.
    pub fn fail(
        &self,
        kind: WalletFailureKind,
        message: impl Into<String>,
        response_payload: Option<serde_json::Value>,
    ) -> Result<Vec<WalletEvent>, PaymentError> {
        if !self.status.can_reject() {
            return Err(self.invalid_transition("fail"));
        }
        Ok(vec![WalletEvent::WalletTransactionFailed {
            kind,
            message: message.into(),
            response_payload,
            failed_at: Utc::now(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::PaymentMethod;

    fn open_cmd(phone: &str) -> OpenWalletTransaction {
        OpenWalletTransaction {
            wallet_id: AggregateId::new(),
            display_id: "WTX-000001".to_string(),
            transaction_reference: "WR-0123456789ABCDEF0123456789ABCDEF".to_string(),
            payment_id: AggregateId::new(),
            payment_method: PaymentMethod::WalletA,
            wallet_phone: phone.to_string(),
            amount: Money::from_minor(25500),
            payment_amount: Money::from_minor(25500),
        }
    }

    fn opened() -> WalletTransaction {
        let mut wallet = WalletTransaction::default();
        let events = wallet.open(open_cmd("770000000")).unwrap();
        wallet.apply_events(events);
        wallet
    }

    fn processing() -> WalletTransaction {
        let mut wallet = opened();
        let events = wallet
            .start_processing(serde_json::json!({"amount": "255.00"}))
            .unwrap();
        wallet.apply_events(events);
        wallet
    }

    #[test]
    fn test_open_wallet_transaction() {
        let wallet = opened();
        assert_eq!(wallet.status(), PaymentStatus::Pending);
        assert_eq!(wallet.wallet_type(), WalletType::WalletA);
        assert_eq!(wallet.wallet_phone(), "770000000");
        assert_eq!(wallet.fees(), Money::zero());
    }

    #[test]
    fn test_open_validates_phone_for_wallet_type() {
        let result = WalletTransaction::default().open(open_cmd("730000000"));
        assert!(matches!(
            result,
            Err(PaymentError::InvalidWalletPhone {
                wallet_type: WalletType::WalletA,
                ..
            })
        ));
    }

    #[test]
    fn test_open_requires_matching_amount() {
        let mut cmd = open_cmd("770000000");
        cmd.amount = Money::from_minor(100);
        assert!(matches!(
            WalletTransaction::default().open(cmd),
            Err(PaymentError::AmountMismatch { .. })
        ));
    }

    #[test]
    fn test_open_rejects_non_wallet_method() {
        let mut cmd = open_cmd("770000000");
        cmd.payment_method = PaymentMethod::CashOnDelivery;
        assert!(matches!(
            WalletTransaction::default().open(cmd),
            Err(PaymentError::NotAWalletMethod(_))
        ));
    }

    #[test]
    fn test_complete_records_gateway_outcome() {
        let mut wallet = processing();
        let events = wallet
            .complete(
                "GW-1".to_string(),
                Money::from_minor(150),
                serde_json::json!({"status": "ok"}),
            )
            .unwrap();
        wallet.apply_events(events);

        assert_eq!(wallet.status(), PaymentStatus::Completed);
        assert_eq!(wallet.wallet_transaction_id(), Some("GW-1"));
        assert_eq!(wallet.fees(), Money::from_minor(150));
        assert!(wallet.is_terminal());
        assert!(wallet.payment_failure_reason().is_none());
    }

    #[test]
    fn test_complete_requires_processing() {
        assert!(opened()
            .complete("GW-1".to_string(), Money::zero(), serde_json::Value::Null)
            .is_err());
    }

    #[test]
    fn test_failed_wallet_is_never_reopened() {
        let mut wallet = processing();
        let events = wallet
            .fail(WalletFailureKind::Timeout, "no response after 30000ms", None)
            .unwrap();
        wallet.apply_events(events);

        assert_eq!(wallet.status(), PaymentStatus::Failed);
        assert_eq!(
            wallet.payment_failure_reason().as_deref(),
            Some("wallet gateway timeout: no response after 30000ms")
        );

        assert!(wallet.start_processing(serde_json::Value::Null).is_err());
        assert!(wallet
            .complete("GW-1".to_string(), Money::zero(), serde_json::Value::Null)
            .is_err());
        assert!(wallet.fail(WalletFailureKind::Declined, "again", None).is_err());
    }

    #[test]
    fn test_payment_reasons_distinguish_failure_kinds() {
        assert_eq!(
            WalletFailureKind::Declined.payment_reason("insufficient balance"),
            "wallet payment declined: insufficient balance"
        );
        assert_eq!(
            WalletFailureKind::GatewayError.payment_reason("connection reset"),
            "wallet gateway error: connection reset"
        );
    }
}
