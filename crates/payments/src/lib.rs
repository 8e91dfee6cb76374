//! Payment processing for orders.
//!
//! This crate provides:
//! - The wallet gateway adapter trait and an in-memory gateway
//! - `PaymentService`: payment creation, dispatch by method, manual transitions
//! - `WalletReconciler`: the bounded gateway call, the two-hop reconciliation
//!   of wallet outcomes into payments and orders, and the recovery sweep
//!
//! E-wallet payments are accepted for processing and settled in the
//! background. Creating one succeeds even if the charge later fails; the
//! final outcome is read from the payment.

pub mod gateway;
pub mod reconciler;
pub mod service;

pub use gateway::{
    GatewayError, InMemoryWalletGateway, ScriptedOutcome, WalletChargeReceipt,
    WalletChargeRequest, WalletGateway,
};
pub use reconciler::{ReconcilerConfig, RecoveryReport, WalletReconciler};
pub use service::{PaymentCreated, PaymentService, Reconciliation, StatusSummary};
