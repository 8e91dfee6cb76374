//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{
    Currency, CustomerContact, ExternalSync, OrderAmounts, OrderItem, OrderPaymentStatus,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed with its priced items.
    OrderPlaced(Box<OrderPlacedData>),

    /// The order's payment status changed.
    PaymentStatusChanged(PaymentStatusChangedData),

    /// Order was confirmed after payment.
    OrderConfirmed(OrderConfirmedData),

    /// Fulfillment started.
    ProcessingStarted(ProcessingStartedData),

    /// Order was handed to the carrier.
    OrderShipped(OrderShippedData),

    /// Order reached the customer.
    OrderDelivered(OrderDeliveredData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::PaymentStatusChanged(_) => "OrderPaymentStatusChanged",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::ProcessingStarted(_) => "OrderProcessingStarted",
            OrderEvent::OrderShipped(_) => "OrderShipped",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub display_id: String,
    pub order_number: String,
    pub user_id: Option<String>,
    pub customer: CustomerContact,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub items: Vec<OrderItem>,
    pub amounts: OrderAmounts,
    pub currency: Currency,
    pub shipping_method: Option<String>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub external_sync: ExternalSync,
    pub placed_at: DateTime<Utc>,
}

/// Data for PaymentStatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusChangedData {
    pub from: OrderPaymentStatus,
    pub to: OrderPaymentStatus,
    pub changed_at: DateTime<Utc>,
}

/// Data for OrderConfirmed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub confirmed_at: DateTime<Utc>,
}

/// Data for ProcessingStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStartedData {
    pub started_at: DateTime<Utc>,
}

/// Data for OrderShipped event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub tracking_number: String,
    pub shipped_at: DateTime<Utc>,
}

/// Data for OrderDelivered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub delivered_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}
