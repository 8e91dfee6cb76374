//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use domain::OrderService;
use ::payments::PaymentService;
use store::RecordStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore> {
    pub order_service: OrderService<S>,
    pub payment_service: PaymentService<S>,
}
