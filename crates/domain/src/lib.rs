//! Domain layer for the order and payment lifecycle.
//!
//! This crate provides:
//! - Aggregate trait and CommandHandler (load, decide, save at the loaded version)
//! - Exact decimal `Money` and the order amount calculator
//! - Order aggregate with its fulfillment state machine, and the OrderService
//! - Payment and WalletTransaction aggregates with their state machines
//! - Wallet numbering-plan validation and the payment method dispatch table

pub mod aggregate;
pub mod command;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{CommandHandler, CommandResult};
pub use error::{DomainError, ErrorKind};
pub use money::Money;
pub use order::{
    AmountCalculator, CancelOrder, CreateOrder, Currency, CustomerContact, InMemoryProductCatalog,
    Order, OrderAmounts, OrderError, OrderEvent, OrderItem, OrderLine, OrderPaymentStatus,
    OrderService, OrderStatus, PricingConfig, ProductCatalog, ProductId, ProductSnapshot,
    ShipOrder, UpdateOrderStatus,
};
pub use payment::{
    CreatePayment, Payment, PaymentError, PaymentEvent, PaymentMethod, PaymentRoute,
    PaymentStatus, WalletEvent, WalletFailureKind, WalletTransaction, WalletType,
};
