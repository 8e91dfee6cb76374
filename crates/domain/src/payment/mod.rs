//! Payment and wallet transaction aggregates.

mod aggregate;
mod commands;
mod events;
mod method;
mod state;
mod wallet;

pub use aggregate::{Payment, keys};
pub use commands::{CreatePayment, InitiatePayment, OpenWalletTransaction};
pub use events::{PaymentEvent, PaymentInitiatedData, WalletEvent, WalletTransactionOpenedData};
pub use method::{PaymentMethod, PaymentRoute, WalletType};
pub use state::PaymentStatus;
pub use wallet::{WalletFailureKind, WalletTransaction, keys as wallet_keys};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The payment or wallet transaction is not in the expected state.
    #[error("Invalid state transition: cannot {action} {aggregate} in {current_state} state")]
    InvalidStateTransition {
        aggregate: &'static str,
        current_state: PaymentStatus,
        action: &'static str,
    },

    /// Amount must be positive.
    #[error("Invalid amount: {0} (must be greater than 0)")]
    InvalidAmount(Money),

    /// More fractional digits than money carries.
    #[error("Invalid amount: {0} has more than 2 decimal places")]
    TooManyDecimalPlaces(Money),

    /// A single payment may not exceed what the order costs.
    #[error("Amount {amount} exceeds the order total {order_total}")]
    AmountExceedsOrderTotal { amount: Money, order_total: Money },

    /// Summing payment amounts left the decimal range.
    #[error("Total of {status} payments is out of range")]
    TotalOutOfRange { status: PaymentStatus },

    /// A manual reject would race the wallet leg, or undo a collected charge.
    #[error("Cannot reject payment while its wallet transaction is {wallet_status}")]
    WalletLegUnsettled { wallet_status: PaymentStatus },

    /// The wallet leg doesn't carry the payment's amount.
    #[error("Amount mismatch: payment is {expected}, wallet transaction is {found}")]
    AmountMismatch { expected: Money, found: Money },

    /// An e-wallet payment without a phone number.
    #[error("Wallet phone is required for {0} payments")]
    MissingWalletPhone(WalletType),

    /// The phone doesn't fit the wallet's numbering plan.
    #[error("Invalid {wallet_type} phone number: {phone}")]
    InvalidWalletPhone {
        wallet_type: WalletType,
        phone: String,
    },

    /// A wallet leg was requested for a method that has none.
    #[error("{0} is not an e-wallet payment method")]
    NotAWalletMethod(PaymentMethod),

    /// The order can't take payments in its current state.
    #[error("Order in {order_status} state cannot accept payments")]
    OrderNotPayable { order_status: String },

    /// The payment currency differs from the order's.
    #[error("Currency mismatch: order is in {expected}, payment is in {found}")]
    CurrencyMismatch { expected: String, found: String },

    /// Unknown payment method name.
    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    /// Unknown payment status name.
    #[error("Unknown payment status: {0}")]
    UnknownStatus(String),

    /// Payment is already created.
    #[error("Payment already created")]
    AlreadyCreated,
}

impl PaymentError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidStateTransition { .. }
            | PaymentError::OrderNotPayable { .. }
            | PaymentError::WalletLegUnsettled { .. } => ErrorKind::InvalidStateTransition,
            PaymentError::AmountExceedsOrderTotal { .. } => ErrorKind::BusinessRule,
            PaymentError::TotalOutOfRange { .. } => ErrorKind::Internal,
            PaymentError::InvalidAmount(_)
            | PaymentError::TooManyDecimalPlaces(_)
            | PaymentError::MissingWalletPhone(_)
            | PaymentError::InvalidWalletPhone { .. }
            | PaymentError::NotAWalletMethod(_)
            | PaymentError::CurrencyMismatch { .. }
            | PaymentError::UnknownPaymentMethod(_)
            | PaymentError::UnknownStatus(_) => ErrorKind::Validation,
            PaymentError::AmountMismatch { .. } | PaymentError::AlreadyCreated => {
                ErrorKind::Integrity
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PaymentError::InvalidAmount(Money::zero()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PaymentError::InvalidStateTransition {
                aggregate: "payment",
                current_state: PaymentStatus::Pending,
                action: "refund",
            }
            .kind(),
            ErrorKind::InvalidStateTransition
        );
        assert_eq!(
            PaymentError::AmountExceedsOrderTotal {
                amount: Money::from_minor(30000),
                order_total: Money::from_minor(25500),
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            PaymentError::WalletLegUnsettled {
                wallet_status: PaymentStatus::Processing,
            }
            .to_string(),
            "Cannot reject payment while its wallet transaction is PROCESSING"
        );
        assert_eq!(
            PaymentError::MissingWalletPhone(WalletType::WalletC).to_string(),
            "Wallet phone is required for WALLET_C payments"
        );
    }
}
