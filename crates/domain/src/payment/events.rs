//! Payment and wallet transaction domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;
use crate::order::Currency;

use super::{PaymentMethod, WalletFailureKind, WalletType};

/// Events that can occur on a payment aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    /// Payment attempt was created.
    PaymentInitiated(Box<PaymentInitiatedData>),

    /// Payment was handed to a gateway.
    ProcessingStarted { started_at: DateTime<Utc> },

    /// Money was collected.
    PaymentCompleted {
        gateway_transaction_id: Option<String>,
        processed_at: DateTime<Utc>,
    },

    /// Payment attempt failed.
    PaymentFailed {
        reason: String,
        processed_at: DateTime<Utc>,
    },

    /// Collected money was returned.
    PaymentRefunded {
        reason: Option<String>,
        refunded_at: DateTime<Utc>,
    },

    /// Payment was abandoned before collection.
    PaymentCancelled {
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    },
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentInitiated(_) => "PaymentInitiated",
            PaymentEvent::ProcessingStarted { .. } => "PaymentProcessingStarted",
            PaymentEvent::PaymentCompleted { .. } => "PaymentCompleted",
            PaymentEvent::PaymentFailed { .. } => "PaymentFailed",
            PaymentEvent::PaymentRefunded { .. } => "PaymentRefunded",
            PaymentEvent::PaymentCancelled { .. } => "PaymentCancelled",
        }
    }
}

/// Data for PaymentInitiated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub payment_id: AggregateId,
    pub display_id: String,
    pub transaction_id: String,
    pub order_id: AggregateId,
    pub payment_method: PaymentMethod,
    pub payment_gateway: String,
    pub amount: Money,
    pub currency: Currency,
    /// Bank reference supplied with a transfer, kept for manual reconciliation.
    pub gateway_transaction_id: Option<String>,
    pub initiated_at: DateTime<Utc>,
}

/// Events that can occur on a wallet transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    /// Wallet leg of a payment was created.
    WalletTransactionOpened(Box<WalletTransactionOpenedData>),

    /// Charge request is being sent to the gateway.
    WalletProcessingStarted {
        request_payload: serde_json::Value,
        started_at: DateTime<Utc>,
    },

    /// Gateway approved the charge.
    WalletTransactionCompleted {
        wallet_transaction_id: String,
        fees: Money,
        response_payload: serde_json::Value,
        completed_at: DateTime<Utc>,
    },

    /// Charge was declined, errored, or timed out.
    WalletTransactionFailed {
        kind: WalletFailureKind,
        message: String,
        response_payload: Option<serde_json::Value>,
        failed_at: DateTime<Utc>,
    },
}

impl DomainEvent for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletTransactionOpened(_) => "WalletTransactionOpened",
            WalletEvent::WalletProcessingStarted { .. } => "WalletProcessingStarted",
            WalletEvent::WalletTransactionCompleted { .. } => "WalletTransactionCompleted",
            WalletEvent::WalletTransactionFailed { .. } => "WalletTransactionFailed",
        }
    }
}

/// Data for WalletTransactionOpened event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransactionOpenedData {
    pub wallet_id: AggregateId,
    pub display_id: String,
    pub transaction_reference: String,
    pub payment_id: AggregateId,
    pub wallet_type: WalletType,
    pub wallet_phone: String,
    pub amount: Money,
    pub opened_at: DateTime<Utc>,
}
