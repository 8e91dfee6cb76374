//! Order aggregate and related types.

mod aggregate;
mod catalog;
mod commands;
mod events;
mod pricing;
mod service;
mod state;
mod value_objects;

pub use aggregate::{Order, keys};
pub use catalog::{InMemoryProductCatalog, ProductCatalog, ProductSnapshot};
pub use commands::*;
pub use events::{
    OrderCancelledData, OrderConfirmedData, OrderDeliveredData, OrderEvent, OrderPlacedData,
    OrderShippedData, PaymentStatusChangedData, ProcessingStartedData,
};
pub use pricing::{
    AmountCalculator, Coupon, NoPricingRules, OrderAmounts, PricingConfig, PricingRules,
    StandardPricingRules, compute_amounts,
};
pub use service::OrderService;
pub use state::{OrderPaymentStatus, OrderStatus};
pub use value_objects::{Currency, CustomerContact, ExternalSync, OrderItem, ProductId};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in the expected state.
    #[error(
        "Invalid state transition: cannot {action} order in {current_state} state with {payment_status} payment (requires {requires})"
    )]
    InvalidStateTransition {
        current_state: OrderStatus,
        payment_status: OrderPaymentStatus,
        action: &'static str,
        requires: &'static str,
    },

    /// The order's payment status can't move between these values.
    #[error("Invalid payment status change: {from} -> {to}")]
    InvalidPaymentStatusChange {
        from: OrderPaymentStatus,
        to: OrderPaymentStatus,
    },

    /// Unknown order status name.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be at least 1)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for {product_id}: {price} (must be greater than 0)")]
    InvalidPrice { product_id: String, price: Money },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// A required field is missing or blank.
    #[error("Missing {0}")]
    MissingField(&'static str),

    /// Malformed email address.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Malformed currency code.
    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    /// A line is priced in another currency than the order.
    #[error("Currency mismatch: order is in {expected}, {product_id} is priced in {found}")]
    CurrencyMismatch {
        product_id: String,
        expected: Currency,
        found: Currency,
    },

    /// The product can't be ordered.
    #[error("Product is not available: {0}")]
    ProductUnavailable(String),

    /// Coupon code not recognised.
    #[error("Unknown coupon code: {0}")]
    UnknownCoupon(String),

    /// The discount is larger than everything it would be taken off.
    #[error("Discount exceeds order value: discount {discount}, order value {order_value}")]
    DiscountExceedsOrderValue { discount: Money, order_value: Money },

    /// Amounts don't add up.
    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),

    /// Order is already created.
    #[error("Order already created")]
    AlreadyCreated,
}

impl OrderError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidStateTransition { .. }
            | OrderError::InvalidPaymentStatusChange { .. } => ErrorKind::InvalidStateTransition,
            OrderError::UnknownStatus(_)
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::NoItems
            | OrderError::MissingField(_)
            | OrderError::InvalidEmail(_)
            | OrderError::InvalidCurrency(_)
            | OrderError::CurrencyMismatch { .. }
            | OrderError::ProductUnavailable(_)
            | OrderError::UnknownCoupon(_) => ErrorKind::Validation,
            OrderError::DiscountExceedsOrderValue { .. } | OrderError::AmountMismatch(_) => {
                ErrorKind::BusinessRule
            }
            OrderError::AlreadyCreated => ErrorKind::Integrity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message_names_state_and_action() {
        let err = OrderError::InvalidStateTransition {
            current_state: OrderStatus::Confirmed,
            payment_status: OrderPaymentStatus::Paid,
            action: "ship",
            requires: "PROCESSING status and PAID payment",
        };

        let message = err.to_string();
        assert!(message.contains("cannot ship"));
        assert!(message.contains("CONFIRMED"));
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(OrderError::NoItems.kind(), ErrorKind::Validation);
        assert_eq!(
            OrderError::DiscountExceedsOrderValue {
                discount: Money::from_minor(100),
                order_value: Money::from_minor(50),
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(OrderError::AlreadyCreated.kind(), ErrorKind::Integrity);
    }
}
