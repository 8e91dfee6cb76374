//! Order service: creation, lookups, and guarded status changes.

use std::sync::Arc;

use chrono::Utc;
use common::{AggregateId, Page, PageRequest};
use store::{EventEnvelope, RecordQuery, RecordStore, StoreError};

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    AmountCalculator, CancelOrder, CreateOrder, Currency, Order, OrderError, OrderItem,
    OrderPaymentStatus, OrderStatus, PlaceOrder, ProductCatalog, ShipOrder, UpdateOrderStatus,
    keys,
};

/// Sequence backing `ORD-` display ids.
const DISPLAY_ID_SEQUENCE: &str = "order_display_id";

/// Attempts at drawing an unused order number.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Attempts at applying a payment status change that races another writer.
const PAYMENT_STATUS_ATTEMPTS: usize = 5;

/// Generates an order number: placement date plus 8 random hex digits.
fn generate_order_number() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d"),
        random[..8].to_ascii_uppercase()
    )
}

fn record_transition(transition: &'static str) {
    metrics::counter!("order_transitions_total", "transition" => transition).increment(1);
}

/// Service for managing orders.
///
/// Provides a high-level API for order operations, wrapping the command handler
/// and the collaborators needed to price new orders.
pub struct OrderService<S: RecordStore> {
    handler: CommandHandler<S, Order>,
    catalog: Arc<dyn ProductCatalog>,
    calculator: AmountCalculator,
    default_currency: Currency,
}

impl<S: RecordStore + Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            catalog: Arc::clone(&self.catalog),
            calculator: self.calculator.clone(),
            default_currency: self.default_currency.clone(),
        }
    }
}

impl<S: RecordStore> OrderService<S> {
    /// Creates a new order service.
    pub fn new(store: S, catalog: Arc<dyn ProductCatalog>, calculator: AmountCalculator) -> Self {
        Self {
            handler: CommandHandler::new(store),
            catalog,
            calculator,
            default_currency: Currency::default(),
        }
    }

    /// Sets the currency used when a create request doesn't name one.
    pub fn with_default_currency(mut self, currency: Currency) -> Self {
        self.default_currency = currency;
        self
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Creates a new order.
    ///
    /// Validates the request, snapshots each product from the catalog, prices
    /// the items once, and persists the order in `PENDING`.
    #[tracing::instrument(skip(self, cmd), fields(lines = cmd.lines.len()))]
    pub async fn create_order(
        &self,
        cmd: CreateOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        if cmd.lines.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        cmd.customer.validate()?;

        let currency = cmd
            .currency
            .clone()
            .unwrap_or_else(|| self.default_currency.clone());
        let items = self.resolve_items(&cmd, &currency).await?;
        let amounts = self.calculator.compute(&items, cmd.coupon_code.as_deref())?;

        let sequence = self.handler.store().next_sequence(DISPLAY_ID_SEQUENCE).await?;
        let display_id = format!("ORD-{sequence:06}");
        let order_id = AggregateId::new();

        let mut attempt = 1;
        loop {
            let place = PlaceOrder {
                order_id,
                display_id: display_id.clone(),
                order_number: generate_order_number(),
                user_id: cmd.user_id.clone(),
                customer: cmd.customer.clone(),
                shipping_address: cmd.shipping_address.clone(),
                billing_address: cmd.billing_address.clone(),
                items: items.clone(),
                amounts,
                currency: currency.clone(),
                shipping_method: cmd.shipping_method.clone(),
                coupon_code: cmd.coupon_code.clone(),
                notes: cmd.notes.clone(),
                external_sync: cmd.external_sync.clone(),
            };

            match self.handler.create(order_id, |order| order.place(place)).await {
                Err(DomainError::Store(StoreError::UniqueViolation { key, .. }))
                    if key == keys::ORDER_NUMBER && attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    tracing::debug!(attempt, "order number collision, drawing a new one");
                    attempt += 1;
                }
                Ok(result) => {
                    metrics::counter!("orders_created_total").increment(1);
                    tracing::info!(
                        %order_id,
                        display_id = %result.aggregate.display_id(),
                        order_number = %result.aggregate.order_number(),
                        total = %result.aggregate.amounts().total_amount,
                        "order created"
                    );
                    return Ok(result);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolves each requested line into an item with a product snapshot.
    async fn resolve_items(
        &self,
        cmd: &CreateOrder,
        currency: &Currency,
    ) -> Result<Vec<OrderItem>, DomainError> {
        let mut items = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                }
                .into());
            }

            let product = self
                .catalog
                .find_product(&line.product_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Product", &line.product_id))?;

            if !product.active {
                return Err(OrderError::ProductUnavailable(product.product_id.to_string()).into());
            }
            if &product.currency != currency {
                return Err(OrderError::CurrencyMismatch {
                    product_id: product.product_id.to_string(),
                    expected: currency.clone(),
                    found: product.currency,
                }
                .into());
            }

            items.push(
                OrderItem::new(product.product_id, product.name, line.quantity, product.price)
                    .with_name_ar(product.name_ar)
                    .with_sku(product.sku)
                    .with_attributes(line.attributes.clone()),
            );
        }
        Ok(items)
    }

    /// Loads an order by ID, failing with `NotFound` if it doesn't exist.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.handler.get(order_id).await
    }

    /// Finds an order by its display ID (`ORD-000123`).
    pub async fn find_by_display_id(&self, display_id: &str) -> Result<Option<Order>, DomainError> {
        self.handler.find_unique(keys::DISPLAY_ID, display_id).await
    }

    /// Finds an order by its order number.
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, DomainError> {
        self.handler.find_unique(keys::ORDER_NUMBER, order_number).await
    }

    /// Finds an order by internal ID, display ID, or order number.
    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, DomainError> {
        let reference = reference.trim();
        if let Some(id) = AggregateId::parse(reference) {
            return self.handler.load(id).await;
        }
        if let Some(order) = self.find_by_display_id(reference).await? {
            return Ok(Some(order));
        }
        self.find_by_order_number(reference).await
    }

    /// Like [`find_by_reference`](Self::find_by_reference), failing with `NotFound`.
    pub async fn get_by_reference(&self, reference: &str) -> Result<Order, DomainError> {
        self.find_by_reference(reference)
            .await?
            .ok_or_else(|| DomainError::not_found(Order::aggregate_type(), reference))
    }

    /// Lists orders, optionally filtered by user and status, oldest first.
    pub async fn list_orders(
        &self,
        user_id: Option<&str>,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        let mut query = RecordQuery::for_type(Order::aggregate_type());
        if let Some(user_id) = user_id {
            query = query.key(keys::USER_ID, user_id);
        }
        if let Some(status) = status {
            query = query.key(keys::STATUS, status.as_str());
        }
        self.handler.page(query, page).await
    }

    /// Lists a user's orders.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        self.list_orders(Some(user_id), None, page).await
    }

    /// Lists orders in a status.
    pub async fn list_by_status(
        &self,
        status: OrderStatus,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        self.list_orders(None, Some(status), page).await
    }

    /// Returns the audit log of an order.
    pub async fn history(&self, order_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        self.handler.get(order_id).await?;
        self.handler.history(order_id).await
    }

    /// Applies a payment outcome to the order's payment status.
    ///
    /// `Paid` on a pending order also confirms it. Retries when it races
    /// another writer, since payment outcomes arrive from background work.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: AggregateId,
        payment_status: OrderPaymentStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute_with_retry(order_id, PAYMENT_STATUS_ATTEMPTS, |order| {
                order.record_payment_status(payment_status)
            })
            .await?;

        if !result.events.is_empty() {
            tracing::info!(%order_id, %payment_status, status = %result.aggregate.status(), "order payment status updated");
            if result.events.len() > 1 {
                record_transition("confirm");
            }
        }
        Ok(result)
    }

    /// Confirms a pending order whose payment is recorded as paid.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, order_id: AggregateId) -> Result<CommandResult<Order>, DomainError> {
        let result = self.handler.execute(order_id, |order| order.confirm()).await?;
        record_transition("confirm");
        tracing::info!(%order_id, "order confirmed");
        Ok(result)
    }

    /// Starts fulfillment of a confirmed order.
    #[tracing::instrument(skip(self))]
    pub async fn start_processing(
        &self,
        order_id: AggregateId,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute(order_id, |order| order.start_processing())
            .await?;
        record_transition("start_processing");
        tracing::info!(%order_id, "order processing started");
        Ok(result)
    }

    /// Ships a paid, processing order.
    #[tracing::instrument(skip(self))]
    pub async fn ship(&self, cmd: ShipOrder) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute(cmd.order_id, |order| order.ship(&cmd.tracking_number))
            .await?;
        record_transition("ship");
        tracing::info!(order_id = %cmd.order_id, tracking_number = %cmd.tracking_number, "order shipped");
        Ok(result)
    }

    /// Marks a shipped order as delivered.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: AggregateId) -> Result<CommandResult<Order>, DomainError> {
        let result = self.handler.execute(order_id, |order| order.deliver()).await?;
        record_transition("deliver");
        tracing::info!(%order_id, "order delivered");
        Ok(result)
    }

    /// Cancels a pending or confirmed order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        let reason = cmd.reason.clone();
        let result = self
            .handler
            .execute(cmd.order_id, |order| order.cancel(reason))
            .await?;
        record_transition("cancel");
        tracing::info!(order_id = %cmd.order_id, reason = ?cmd.reason, "order cancelled");
        Ok(result)
    }

    /// Moves an order to a target status through the matching guarded transition.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        cmd: UpdateOrderStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute(cmd.order_id, |order| {
                order.transition_to(cmd.target, cmd.tracking_number.as_deref(), cmd.reason.clone())
            })
            .await?;
        record_transition(match cmd.target {
            OrderStatus::Confirmed => "confirm",
            OrderStatus::Processing => "start_processing",
            OrderStatus::Shipped => "ship",
            OrderStatus::Delivered => "deliver",
            _ => "cancel",
        });
        tracing::info!(order_id = %cmd.order_id, target = %cmd.target, "order status updated");
        Ok(result)
    }
}
