//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use store::{RecordKey, Version};

use crate::aggregate::Aggregate;
use crate::money::Money;
use crate::order::Currency;

use super::{
    InitiatePayment, PaymentError, PaymentEvent, PaymentMethod, PaymentStatus,
    events::PaymentInitiatedData,
};

/// Record key names for payments.
pub mod keys {
    pub const DISPLAY_ID: &str = "display_id";
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const ORDER_ID: &str = "order_id";
    pub const STATUS: &str = "status";
}

/// One attempt to collect money for an order.
///
/// An order may have many payments over time; each one moves through its
/// own state machine and never changes order or amount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    display_id: String,
    transaction_id: String,
    gateway_transaction_id: Option<String>,
    order_id: Option<AggregateId>,
    payment_method: PaymentMethod,
    payment_gateway: String,
    amount: Money,
    currency: Currency,
    status: PaymentStatus,
    failure_reason: Option<String>,
    refund_reason: Option<String>,
    cancellation_reason: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
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
            PaymentEvent::PaymentInitiated(data) => self.apply_initiated(*data),
            PaymentEvent::ProcessingStarted { started_at } => {
                self.status = PaymentStatus::Processing;
                self.updated_at = Some(started_at);
            }
            PaymentEvent::PaymentCompleted {
                gateway_transaction_id,
                processed_at,
            } => {
                self.status = PaymentStatus::Completed;
                if gateway_transaction_id.is_some() {
                    self.gateway_transaction_id = gateway_transaction_id;
                }
                self.processed_at = Some(processed_at);
                self.updated_at = Some(processed_at);
            }
            PaymentEvent::PaymentFailed {
                reason,
                processed_at,
            } => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason);
                self.processed_at = Some(processed_at);
                self.updated_at = Some(processed_at);
            }
            PaymentEvent::PaymentRefunded {
                reason,
                refunded_at,
            } => {
                self.status = PaymentStatus::Refunded;
                self.refund_reason = reason;
                self.refunded_at = Some(refunded_at);
                self.updated_at = Some(refunded_at);
            }
            PaymentEvent::PaymentCancelled {
                reason,
                cancelled_at,
            } => {
                self.status = PaymentStatus::Cancelled;
                self.cancellation_reason = reason;
                self.cancelled_at = Some(cancelled_at);
                self.updated_at = Some(cancelled_at);
            }
        }
    }

    fn keys(&self) -> Vec<RecordKey> {
        let mut keys = vec![
            RecordKey::unique(keys::DISPLAY_ID, self.display_id.clone()),
            RecordKey::unique(keys::TRANSACTION_ID, self.transaction_id.clone()),
            RecordKey::lookup(keys::STATUS, self.status.as_str()),
        ];
        if let Some(order_id) = self.order_id {
            keys.push(RecordKey::lookup(keys::ORDER_ID, order_id.to_string()));
        }
        keys
    }
}

impl Payment {
    fn apply_initiated(&mut self, data: PaymentInitiatedData) {
        self.id = Some(data.payment_id);
        self.display_id = data.display_id;
        self.transaction_id = data.transaction_id;
        self.gateway_transaction_id = data.gateway_transaction_id;
        self.order_id = Some(data.order_id);
        self.payment_method = data.payment_method;
        self.payment_gateway = data.payment_gateway;
        self.amount = data.amount;
        self.currency = data.currency;
        self.status = PaymentStatus::Pending;
        self.created_at = Some(data.initiated_at);
        self.updated_at = Some(data.initiated_at);
    }

    fn invalid_transition(&self, action: &'static str) -> PaymentError {
        PaymentError::InvalidStateTransition {
            aggregate: "payment",
            current_state: self.status,
            action,
        }
    }
}

// Query methods
impl Payment {
    pub fn display_id(&self) -> &str {
        &self.display_id
    }

    /// Returns the locally generated transaction ID.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Returns the gateway's transaction ID, or the bank reference for transfers.
    pub fn gateway_transaction_id(&self) -> Option<&str> {
        self.gateway_transaction_id.as_deref()
    }

    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_gateway(&self) -> &str {
        &self.payment_gateway
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn refund_reason(&self) -> Option<&str> {
        self.refund_reason.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns true while the payment still awaits its first processing step.
    pub fn can_be_processed(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    /// Returns true if the money was collected.
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

// Command methods (return events)
impl Payment {
    /// Creates the payment in `PENDING`.
    pub fn initiate(&self, cmd: InitiatePayment) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::AlreadyCreated);
        }
        if !cmd.amount.is_positive() {
            return Err(PaymentError::InvalidAmount(cmd.amount));
        }

        let bank_reference = cmd
            .bank_reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(vec![PaymentEvent::PaymentInitiated(Box::new(
            PaymentInitiatedData {
                payment_id: cmd.payment_id,
                display_id: cmd.display_id,
                transaction_id: cmd.transaction_id,
                order_id: cmd.order_id,
                payment_method: cmd.payment_method,
                payment_gateway: cmd.payment_method.gateway().to_string(),
                amount: cmd.amount,
                currency: cmd.currency,
                gateway_transaction_id: bank_reference,
                initiated_at: Utc::now(),
            },
        ))])
    }

    /// Marks the payment as handed to the gateway.
    pub fn mark_processing(&self) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_start_processing() {
            return Err(self.invalid_transition("start processing"));
        }
        Ok(vec![PaymentEvent::ProcessingStarted {
            started_at: Utc::now(),
        }])
    }

    /// Confirms a pending payment, e.g. when cash is collected.
    pub fn confirm(
        &self,
        gateway_transaction_id: Option<String>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_confirm() {
            return Err(self.invalid_transition("confirm"));
        }
        Ok(vec![PaymentEvent::PaymentCompleted {
            gateway_transaction_id: gateway_transaction_id.filter(|id| !id.trim().is_empty()),
            processed_at: Utc::now(),
        }])
    }

    /// Completes a processing payment with the gateway's transaction ID.
    pub fn settle(&self, gateway_transaction_id: String) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_settle() {
            return Err(self.invalid_transition("settle"));
        }
        Ok(vec![PaymentEvent::PaymentCompleted {
            gateway_transaction_id: Some(gateway_transaction_id),
            processed_at: Utc::now(),
        }])
    }

    /// Fails a payment that hasn't reached a terminal state.
    pub fn reject(&self, reason: impl Into<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_reject() {
            return Err(self.invalid_transition("reject"));
        }
        Ok(vec![PaymentEvent::PaymentFailed {
            reason: reason.into(),
            processed_at: Utc::now(),
        }])
    }

    /// Refunds a completed payment.
    pub fn refund(&self, reason: Option<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_refund() {
            return Err(self.invalid_transition("refund"));
        }
        Ok(vec![PaymentEvent::PaymentRefunded {
            reason,
            refunded_at: Utc::now(),
        }])
    }

    /// Abandons a pending payment.
    pub fn cancel(&self, reason: Option<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_cancel() {
            return Err(self.invalid_transition("cancel"));
        }
        Ok(vec![PaymentEvent::PaymentCancelled {
            reason,
            cancelled_at: Utc::now(),
        }])
    }
}
