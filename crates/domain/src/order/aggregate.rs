//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use store::{RecordKey, Version};

use crate::aggregate::Aggregate;

use super::{
    Currency, CustomerContact, ExternalSync, OrderAmounts, OrderError, OrderEvent, OrderItem,
    OrderPaymentStatus, OrderStatus, PlaceOrder,
    events::{
        OrderCancelledData, OrderConfirmedData, OrderDeliveredData, OrderPlacedData,
        OrderShippedData, PaymentStatusChangedData, ProcessingStartedData,
    },
};

/// Record key names for orders.
pub mod keys {
    pub const DISPLAY_ID: &str = "display_id";
    pub const ORDER_NUMBER: &str = "order_number";
    pub const STATUS: &str = "status";
    pub const USER_ID: &str = "user_id";
}

/// Order aggregate root.
///
/// Owns its items and money breakdown, both fixed when the order is placed.
/// Status changes only through the guarded command methods below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    display_id: String,
    order_number: String,
    user_id: Option<String>,
    status: OrderStatus,
    payment_status: OrderPaymentStatus,
    customer: CustomerContact,
    shipping_address: Option<serde_json::Value>,
    billing_address: Option<serde_json::Value>,
    items: Vec<OrderItem>,
    amounts: OrderAmounts,
    currency: Currency,
    shipping_method: Option<String>,
    tracking_number: Option<String>,
    coupon_code: Option<String>,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    external_sync: ExternalSync,
    confirmed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderPlaced(data) => self.apply_placed(*data),
            OrderEvent::PaymentStatusChanged(data) => {
                self.payment_status = data.to;
                self.updated_at = Some(data.changed_at);
            }
            OrderEvent::OrderConfirmed(data) => {
                self.status = OrderStatus::Confirmed;
                self.confirmed_at = Some(data.confirmed_at);
                self.updated_at = Some(data.confirmed_at);
            }
            OrderEvent::ProcessingStarted(data) => {
                self.status = OrderStatus::Processing;
                self.updated_at = Some(data.started_at);
            }
            OrderEvent::OrderShipped(data) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = Some(data.tracking_number);
                self.shipped_at = Some(data.shipped_at);
                self.updated_at = Some(data.shipped_at);
            }
            OrderEvent::OrderDelivered(data) => {
                self.status = OrderStatus::Delivered;
                self.delivered_at = Some(data.delivered_at);
                self.updated_at = Some(data.delivered_at);
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = data.reason;
                self.cancelled_at = Some(data.cancelled_at);
                self.updated_at = Some(data.cancelled_at);
            }
        }
    }

    fn keys(&self) -> Vec<RecordKey> {
        let mut keys = vec![
            RecordKey::unique(keys::DISPLAY_ID, self.display_id.clone()),
            RecordKey::unique(keys::ORDER_NUMBER, self.order_number.clone()),
            RecordKey::lookup(keys::STATUS, self.status.as_str()),
        ];
        if let Some(user_id) = &self.user_id {
            keys.push(RecordKey::lookup(keys::USER_ID, user_id.clone()));
        }
        keys
    }
}

impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.display_id = data.display_id;
        self.order_number = data.order_number;
        self.user_id = data.user_id;
        self.status = OrderStatus::Pending;
        self.payment_status = OrderPaymentStatus::Pending;
        self.customer = data.customer;
        self.shipping_address = data.shipping_address;
        self.billing_address = data.billing_address;
        self.items = data.items;
        self.amounts = data.amounts;
        self.currency = data.currency;
        self.shipping_method = data.shipping_method;
        self.coupon_code = data.coupon_code;
        self.notes = data.notes;
        self.external_sync = data.external_sync;
        self.created_at = Some(data.placed_at);
        self.updated_at = Some(data.placed_at);
    }

    fn invalid_transition(&self, action: &'static str, requires: &'static str) -> OrderError {
        OrderError::InvalidStateTransition {
            current_state: self.status,
            payment_status: self.payment_status,
            action,
            requires,
        }
    }
}

// Query methods
impl Order {
    pub fn display_id(&self) -> &str {
        &self.display_id
    }

    /// Returns the globally unique order number.
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the fulfillment status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the order's own view of its payment.
    pub fn payment_status(&self) -> OrderPaymentStatus {
        self.payment_status
    }

    pub fn customer(&self) -> &CustomerContact {
        &self.customer
    }

    pub fn shipping_address(&self) -> Option<&serde_json::Value> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&serde_json::Value> {
        self.billing_address.as_ref()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the money breakdown fixed at placement.
    pub fn amounts(&self) -> &OrderAmounts {
        &self.amounts
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn shipping_method(&self) -> Option<&str> {
        self.shipping_method.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn external_sync(&self) -> &ExternalSync {
        &self.external_sync
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
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

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order with priced items.
    ///
    /// Rejects orders without items, with invalid items, with lines in
    /// another currency, or whose amounts don't add up.
    pub fn place(&self, cmd: PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        cmd.customer.validate()?;
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &cmd.items {
            item.validate()?;
        }
        cmd.amounts.verify(&cmd.items)?;

        Ok(vec![OrderEvent::OrderPlaced(Box::new(OrderPlacedData {
            order_id: cmd.order_id,
            display_id: cmd.display_id,
            order_number: cmd.order_number,
            user_id: cmd.user_id,
            customer: cmd.customer,
            shipping_address: cmd.shipping_address,
            billing_address: cmd.billing_address,
            items: cmd.items,
            amounts: cmd.amounts,
            currency: cmd.currency,
            shipping_method: cmd.shipping_method,
            coupon_code: cmd.coupon_code,
            notes: cmd.notes,
            external_sync: cmd.external_sync,
            placed_at: Utc::now(),
        }))])
    }

    /// Records a new payment status for the order.
    ///
    /// `Paid` on a pending order also confirms it; this is the only place a
    /// payment drives the order's status. `Failed` never overwrites `Paid` or
    /// `Refunded`, so a failed retry can't undo a successful attempt. Setting
    /// the current value again changes nothing.
    pub fn record_payment_status(
        &self,
        new_status: OrderPaymentStatus,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        use OrderPaymentStatus as P;

        let current = self.payment_status;
        if current == new_status {
            return Ok(vec![]);
        }

        match (current, new_status) {
            (P::Paid | P::Refunded, P::Failed) => return Ok(vec![]),
            (P::Paid | P::Refunded, P::Pending) | (P::Pending | P::Failed, P::Refunded) => {
                return Err(OrderError::InvalidPaymentStatusChange {
                    from: current,
                    to: new_status,
                });
            }
            _ => {}
        }

        let now = Utc::now();
        let mut events = vec![OrderEvent::PaymentStatusChanged(PaymentStatusChangedData {
            from: current,
            to: new_status,
            changed_at: now,
        })];

        if new_status == P::Paid && self.status.can_confirm() {
            events.push(OrderEvent::OrderConfirmed(OrderConfirmedData {
                confirmed_at: now,
            }));
        }

        Ok(events)
    }

    /// Confirms a pending, paid order.
    pub fn confirm(&self) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_confirm() || self.payment_status != OrderPaymentStatus::Paid {
            return Err(self.invalid_transition("confirm", "PENDING status and PAID payment"));
        }

        Ok(vec![OrderEvent::OrderConfirmed(OrderConfirmedData {
            confirmed_at: Utc::now(),
        })])
    }

    /// Starts fulfillment of a confirmed order.
    pub fn start_processing(&self) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_start_processing() {
            return Err(self.invalid_transition("start processing", "CONFIRMED status"));
        }

        Ok(vec![OrderEvent::ProcessingStarted(ProcessingStartedData {
            started_at: Utc::now(),
        })])
    }

    /// Ships the order.
    ///
    /// Requires the order to be processing and its own payment status to be
    /// `Paid`; anything else is denied.
    pub fn ship(&self, tracking_number: &str) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_ship() || self.payment_status != OrderPaymentStatus::Paid {
            return Err(self.invalid_transition("ship", "PROCESSING status and PAID payment"));
        }
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(OrderError::MissingField("tracking number"));
        }

        Ok(vec![OrderEvent::OrderShipped(OrderShippedData {
            tracking_number: tracking_number.to_string(),
            shipped_at: Utc::now(),
        })])
    }

    /// Marks a shipped order as delivered.
    pub fn deliver(&self) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_deliver() {
            return Err(self.invalid_transition("deliver", "SHIPPED status"));
        }

        Ok(vec![OrderEvent::OrderDelivered(OrderDeliveredData {
            delivered_at: Utc::now(),
        })])
    }

    /// Cancels a pending or confirmed order.
    pub fn cancel(&self, reason: Option<String>) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_cancel() {
            return Err(self.invalid_transition("cancel", "PENDING or CONFIRMED status"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.filter(|r| !r.trim().is_empty()),
            cancelled_at: Utc::now(),
        })])
    }

    /// Routes an admin status change to the matching guarded transition.
    ///
    /// `Pending` and `Refunded` are never valid targets.
    pub fn transition_to(
        &self,
        target: OrderStatus,
        tracking_number: Option<&str>,
        reason: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        match target {
            OrderStatus::Confirmed => self.confirm(),
            OrderStatus::Processing => self.start_processing(),
            OrderStatus::Shipped => match tracking_number {
                Some(tracking_number) => self.ship(tracking_number),
                None => Err(OrderError::MissingField("tracking number")),
            },
            OrderStatus::Delivered => self.deliver(),
            OrderStatus::Cancelled => self.cancel(reason),
            OrderStatus::Pending => Err(self.invalid_transition("reopen", "no transition back to PENDING")),
            OrderStatus::Refunded => Err(self.invalid_transition(
                "refund",
                "a payment refund; orders are not refunded directly",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::order::AmountCalculator;

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    fn place_cmd(order_id: AggregateId) -> PlaceOrder {
        let items = vec![
            OrderItem::new("P-1", "Kettle", 2, money("100.00")),
            OrderItem::new("P-2", "Mug", 1, money("50.00")),
        ];
        let amounts = AmountCalculator::flat(money("5.00"))
            .compute(&items, None)
            .unwrap();
        PlaceOrder {
            order_id,
            display_id: "ORD-000001".to_string(),
            order_number: "20240101-0A1B2C3D".to_string(),
            user_id: Some("user-1".to_string()),
            customer: CustomerContact::new("Amal", "amal@example.com"),
            shipping_address: Some(serde_json::json!({"city": "Sana'a"})),
            billing_address: None,
            items,
            amounts,
            currency: Currency::default(),
            shipping_method: Some("standard".to_string()),
            coupon_code: None,
            notes: None,
            external_sync: ExternalSync::default(),
        }
    }

    fn placed_order() -> Order {
        let mut order = Order::default();
        let events = order.place(place_cmd(AggregateId::new())).unwrap();
        order.apply_events(events);
        order
    }

    fn run(order: &mut Order, events: Result<Vec<OrderEvent>, OrderError>) {
        order.apply_events(events.unwrap());
    }

    fn paid_order() -> Order {
        let mut order = placed_order();
        let events = order.record_payment_status(OrderPaymentStatus::Paid);
        run(&mut order, events);
        order
    }

    fn processing_order() -> Order {
        let mut order = paid_order();
        let events = order.start_processing();
        run(&mut order, events);
        order
    }

    fn shipped_order() -> Order {
        let mut order = processing_order();
        let events = order.ship("TRK-123");
        run(&mut order, events);
        order
    }

    #[test]
    fn test_place_order() {
        let order = placed_order();

        assert!(order.id().is_some());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), OrderPaymentStatus::Pending);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.amounts().subtotal, money("250.00"));
        assert_eq!(order.amounts().total_amount, money("255.00"));
        assert!(order.created_at().is_some());
    }

    #[test]
    fn test_cannot_place_twice() {
        let order = placed_order();
        let result = order.place(place_cmd(AggregateId::new()));
        assert!(matches!(result, Err(OrderError::AlreadyCreated)));
    }

    #[test]
    fn test_place_requires_items() {
        let mut cmd = place_cmd(AggregateId::new());
        cmd.items.clear();
        assert!(matches!(Order::default().place(cmd), Err(OrderError::NoItems)));
    }

    #[test]
    fn test_place_rejects_inconsistent_amounts() {
        let mut cmd = place_cmd(AggregateId::new());
        cmd.amounts.total_amount = money("1.00");
        assert!(matches!(
            Order::default().place(cmd),
            Err(OrderError::AmountMismatch(_))
        ));
    }

    #[test]
    fn test_paid_confirms_pending_order() {
        let order = placed_order();

        let events = order
            .record_payment_status(OrderPaymentStatus::Paid)
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], OrderEvent::OrderConfirmed(_)));

        let order = paid_order();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.payment_status(), OrderPaymentStatus::Paid);
        assert!(order.confirmed_at().is_some());
    }

    #[test]
    fn test_paid_on_cancelled_order_keeps_status() {
        let mut order = placed_order();
        let events = order.cancel(None);
        run(&mut order, events);

        let events = order.record_payment_status(OrderPaymentStatus::Paid);
        run(&mut order, events);

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment_status(), OrderPaymentStatus::Paid);
    }

    #[test]
    fn test_failed_never_overwrites_paid() {
        let order = paid_order();
        let events = order
            .record_payment_status(OrderPaymentStatus::Failed)
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_failed_payment_keeps_order_status() {
        let mut order = placed_order();
        let events = order.record_payment_status(OrderPaymentStatus::Failed);
        run(&mut order, events);

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), OrderPaymentStatus::Failed);

        // A later attempt can still succeed
        let events = order.record_payment_status(OrderPaymentStatus::Paid);
        run(&mut order, events);
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn test_refund_requires_paid() {
        let order = placed_order();
        assert!(matches!(
            order.record_payment_status(OrderPaymentStatus::Refunded),
            Err(OrderError::InvalidPaymentStatusChange { .. })
        ));

        let mut order = processing_order();
        let events = order.record_payment_status(OrderPaymentStatus::Refunded);
        run(&mut order, events);
        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.payment_status(), OrderPaymentStatus::Refunded);

        // Refunded orders fail closed on shipping
        assert!(matches!(
            order.ship("TRK-1"),
            Err(OrderError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_repeated_payment_status_is_noop() {
        let order = paid_order();
        assert!(order
            .record_payment_status(OrderPaymentStatus::Paid)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_confirm_requires_payment() {
        let order = placed_order();
        let err = order.confirm().unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current_state: OrderStatus::Pending,
                action: "confirm",
                ..
            }
        ));
    }

    #[test]
    fn test_ship_only_from_paid_processing() {
        // Confirmed but not processing
        let order = paid_order();
        let err = order.ship("TRK-1").unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current_state: OrderStatus::Confirmed,
                action: "ship",
                ..
            }
        ));

        let order = shipped_order();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.tracking_number(), Some("TRK-123"));
        assert!(order.shipped_at().is_some());
    }

    #[test]
    fn test_ship_requires_tracking_number() {
        let order = processing_order();
        assert!(matches!(order.ship("  "), Err(OrderError::MissingField(_))));
    }

    #[test]
    fn test_ship_fails_closed_when_payment_status_drifts() {
        // Processing order whose payment status is not PAID
        let mut order = placed_order();
        order.status = OrderStatus::Processing;

        assert!(matches!(
            order.ship("TRK-1"),
            Err(OrderError::InvalidStateTransition {
                payment_status: OrderPaymentStatus::Pending,
                ..
            })
        ));
    }

    #[test]
    fn test_deliver_succeeds_once() {
        let mut order = shipped_order();

        let events = order.deliver();
        run(&mut order, events);
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert!(order.delivered_at().is_some());

        assert!(matches!(
            order.deliver(),
            Err(OrderError::InvalidStateTransition {
                current_state: OrderStatus::Delivered,
                ..
            })
        ));
    }

    #[test]
    fn test_cancel_from_pending_and_confirmed_only() {
        let mut order = placed_order();
        let events = order.cancel(Some("changed mind".to_string()));
        run(&mut order, events);
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancellation_reason(), Some("changed mind"));

        assert!(paid_order().cancel(None).is_ok());
        assert!(processing_order().cancel(None).is_err());
        assert!(shipped_order().cancel(None).is_err());
        assert!(order.cancel(None).is_err());
    }

    #[test]
    fn test_rejected_command_leaves_order_unchanged() {
        let order = placed_order();
        let before = serde_json::to_value(&order).unwrap();

        assert!(order.deliver().is_err());
        assert!(order.ship("TRK-1").is_err());

        assert_eq!(serde_json::to_value(&order).unwrap(), before);
    }

    #[test]
    fn test_transition_to_routes_and_rejects() {
        let order = paid_order();
        let events = order
            .transition_to(OrderStatus::Processing, None, None)
            .unwrap();
        assert!(matches!(events[0], OrderEvent::ProcessingStarted(_)));

        assert!(matches!(
            order.transition_to(OrderStatus::Pending, None, None),
            Err(OrderError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            order.transition_to(OrderStatus::Refunded, None, None),
            Err(OrderError::InvalidStateTransition { .. })
        ));

        let order = processing_order();
        assert!(matches!(
            order.transition_to(OrderStatus::Shipped, None, None),
            Err(OrderError::MissingField(_))
        ));
    }

    #[test]
    fn test_keys() {
        let order = placed_order();
        let keys = order.keys();

        let key = |name: &str| {
            keys.iter()
                .find(|k| k.name == name)
                .map(|k| (k.value.clone(), k.unique))
        };
        assert_eq!(key(keys::ORDER_NUMBER), Some(("20240101-0A1B2C3D".to_string(), true)));
        assert_eq!(key(keys::DISPLAY_ID), Some(("ORD-000001".to_string(), true)));
        assert_eq!(key(keys::STATUS), Some(("PENDING".to_string(), false)));
        assert_eq!(key(keys::USER_ID), Some(("user-1".to_string(), false)));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let order = shipped_order();
        let json = serde_json::to_value(&order).unwrap();
        let restored: Order = serde_json::from_value(json).unwrap();

        assert_eq!(restored.status(), OrderStatus::Shipped);
        assert_eq!(restored.items(), order.items());
        assert_eq!(restored.amounts(), order.amounts());
    }
}
