//! Payment commands.

use common::AggregateId;

use crate::money::Money;
use crate::order::Currency;

use super::PaymentMethod;

/// Request to create a payment attempt for an order.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub order_id: AggregateId,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    /// Falls back to the order's currency.
    pub currency: Option<Currency>,
    /// Required for e-wallet methods.
    pub wallet_phone: Option<String>,
    /// Optional for bank transfers.
    pub bank_reference: Option<String>,
}

impl CreatePayment {
    pub fn new(order_id: AggregateId, payment_method: PaymentMethod, amount: Money) -> Self {
        Self {
            order_id,
            payment_method,
            amount,
            currency: None,
            wallet_phone: None,
            bank_reference: None,
        }
    }

    pub fn with_wallet_phone(mut self, phone: impl Into<String>) -> Self {
        self.wallet_phone = Some(phone.into());
        self
    }

    pub fn with_bank_reference(mut self, reference: impl Into<String>) -> Self {
        self.bank_reference = Some(reference.into());
        self
    }
}

/// Fully identified payment, ready to be initiated on the aggregate.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub payment_id: AggregateId,
    pub display_id: String,
    pub transaction_id: String,
    pub order_id: AggregateId,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub currency: Currency,
    pub bank_reference: Option<String>,
}

/// Fully identified wallet leg, ready to be opened on the aggregate.
#[derive(Debug, Clone)]
pub struct OpenWalletTransaction {
    pub wallet_id: AggregateId,
    pub display_id: String,
    pub transaction_reference: String,
    pub payment_id: AggregateId,
    pub payment_method: PaymentMethod,
    pub wallet_phone: String,
    pub amount: Money,
    /// Amount of the owning payment; the wallet leg must match it.
    pub payment_amount: Money,
}
