//! Order commands.

use common::AggregateId;

use super::{
    Currency, CustomerContact, ExternalSync, OrderAmounts, OrderItem, OrderStatus, ProductId,
};

/// One requested line of a new order; the product is resolved from the catalog.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub attributes: Option<serde_json::Value>,
}

impl OrderLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            attributes: None,
        }
    }
}

/// Command to create a new order from catalog products.
#[derive(Debug, Clone, Default)]
pub struct CreateOrder {
    pub user_id: Option<String>,
    pub customer: CustomerContact,
    pub lines: Vec<OrderLine>,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub shipping_method: Option<String>,
    pub coupon_code: Option<String>,
    /// Falls back to the service's default currency.
    pub currency: Option<Currency>,
    pub notes: Option<String>,
    pub external_sync: ExternalSync,
}

impl CreateOrder {
    /// Creates a new CreateOrder command.
    pub fn new(customer: CustomerContact, lines: Vec<OrderLine>) -> Self {
        Self {
            customer,
            lines,
            ..Default::default()
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_coupon(mut self, coupon_code: impl Into<String>) -> Self {
        self.coupon_code = Some(coupon_code.into());
        self
    }
}

/// Fully priced order, ready to be placed on the aggregate.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
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
}

/// Command to ship an order.
#[derive(Debug, Clone)]
pub struct ShipOrder {
    pub order_id: AggregateId,
    pub tracking_number: String,
}

impl ShipOrder {
    pub fn new(order_id: AggregateId, tracking_number: impl Into<String>) -> Self {
        Self {
            order_id,
            tracking_number: tracking_number.into(),
        }
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub reason: Option<String>,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId) -> Self {
        Self {
            order_id,
            reason: None,
        }
    }

    pub fn with_reason(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: Some(reason.into()),
        }
    }
}

/// Admin command moving an order to a target status.
#[derive(Debug, Clone)]
pub struct UpdateOrderStatus {
    pub order_id: AggregateId,
    pub target: OrderStatus,
    /// Required when the target is `SHIPPED`.
    pub tracking_number: Option<String>,
    /// Recorded when the target is `CANCELLED`.
    pub reason: Option<String>,
}
