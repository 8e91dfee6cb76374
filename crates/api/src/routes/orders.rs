//! Order endpoints: placement, lookups, history, and status changes.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{AggregateId, Page, PageRequest};
use domain::order::ExternalSync;
use domain::{
    Aggregate, CancelOrder, CreateOrder, Currency, CustomerContact, DomainError, Money, Order,
    OrderItem, OrderLine, OrderPaymentStatus, OrderStatus, ShipOrder, UpdateOrderStatus,
};
use serde::{Deserialize, Serialize};
use store::{EventEnvelope, RecordStore};

use crate::error::ApiError;
use crate::extract::{ApiJson, OptionalJson};
use crate::response::{ApiResponse, messages};
use crate::routes::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub shipping_method: Option<String>,
    pub coupon_code: Option<String>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub external_quote_id: Option<String>,
    pub external_invoice_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub attributes: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRequest {
    pub tracking_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

impl CreateOrderRequest {
    fn into_command(self) -> Result<CreateOrder, DomainError> {
        let currency = self
            .currency
            .as_deref()
            .map(Currency::parse)
            .transpose()?;

        let lines = self
            .items
            .into_iter()
            .map(|item| OrderLine {
                product_id: item.product_id.into(),
                quantity: item.quantity,
                attributes: item.attributes,
            })
            .collect();

        let mut customer = CustomerContact::new(self.customer_name, self.customer_email);
        customer.phone = self.customer_phone;

        Ok(CreateOrder {
            user_id: self.user_id,
            customer,
            lines,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            shipping_method: self.shipping_method,
            coupon_code: self.coupon_code,
            currency,
            notes: self.notes,
            external_sync: ExternalSync {
                quote_id: self.external_quote_id,
                invoice_id: self.external_invoice_id,
                ..ExternalSync::default()
            },
        })
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub display_id: String,
    pub order_number: String,
    pub user_id: Option<String>,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub currency: String,
    pub shipping_method: Option<String>,
    pub tracking_number: Option<String>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub external_quote_id: Option<String>,
    pub external_invoice_id: Option<String>,
    pub version: i64,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub product_name_ar: Option<String>,
    pub product_sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            product_name: item.product_name.clone(),
            product_name_ar: item.product_name_ar.clone(),
            product_sku: item.product_sku.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            attributes: item.attributes.clone(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let amounts = order.amounts();
        let customer = order.customer();
        Self {
            id: order.id().map(|id| id.to_string()).unwrap_or_default(),
            display_id: order.display_id().to_string(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id().map(String::from),
            status: order.status(),
            payment_status: order.payment_status(),
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            customer_phone: customer.phone.clone(),
            shipping_address: order.shipping_address().cloned(),
            billing_address: order.billing_address().cloned(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            subtotal: amounts.subtotal,
            tax_amount: amounts.tax_amount,
            shipping_amount: amounts.shipping_amount,
            discount_amount: amounts.discount_amount,
            total_amount: amounts.total_amount,
            currency: order.currency().to_string(),
            shipping_method: order.shipping_method().map(String::from),
            tracking_number: order.tracking_number().map(String::from),
            coupon_code: order.coupon_code().map(String::from),
            notes: order.notes().map(String::from),
            cancellation_reason: order.cancellation_reason().map(String::from),
            external_quote_id: order.external_sync().quote_id.clone(),
            external_invoice_id: order.external_sync().invoice_id.clone(),
            version: order.version().as_i64(),
            confirmed_at: order.confirmed_at(),
            shipped_at: order.shipped_at(),
            delivered_at: order.delivered_at(),
            cancelled_at: order.cancelled_at(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// Response type for audit log entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl From<EventEnvelope> for EventResponse {
    fn from(e: EventEnvelope) -> Self {
        Self {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp,
            payload: e.payload,
        }
    }
}

// -- Handlers --

/// POST /orders — place an order; items are priced from the catalog.
#[tracing::instrument(skip(state, req), fields(lines = req.items.len()))]
pub async fn create<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<ApiResponse<OrderResponse>, ApiError> {
    let cmd = req.into_command()?;
    let result = state.order_service.create_order(cmd).await?;
    Ok(ApiResponse::created(
        messages::ORDER_CREATED,
        OrderResponse::from(&result.aggregate),
    ))
}

/// GET /orders/{id} — look an order up by UUID, display id, or order number.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<OrderResponse>, ApiError> {
    let order = state.order_service.get_by_reference(&id).await?;
    Ok(ApiResponse::ok(
        messages::ORDER_RETRIEVED,
        OrderResponse::from(&order),
    ))
}

/// GET /orders — page through orders, optionally by user and status.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<ApiResponse<Page<OrderResponse>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(DomainError::from)?;
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.size.unwrap_or(defaults.size),
    );

    let orders = state
        .order_service
        .list_orders(query.user_id.as_deref(), status, page)
        .await?;
    Ok(ApiResponse::ok(
        messages::ORDERS_RETRIEVED,
        orders.map(|order| OrderResponse::from(&order)),
    ))
}

/// GET /orders/{id}/events — the order's audit log, oldest first.
#[tracing::instrument(skip(state))]
pub async fn events<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<EventResponse>>, ApiError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let envelopes = state.order_service.history(order_id).await?;
    Ok(ApiResponse::ok(
        messages::ORDER_EVENTS_RETRIEVED,
        envelopes.into_iter().map(EventResponse::from).collect(),
    ))
}

/// PUT /orders/{id}/status — admin move to a target status.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<ApiResponse<OrderResponse>, ApiError> {
    let target: OrderStatus = req.status.parse().map_err(DomainError::from)?;
    let order_id = resolve_order_id(&state, &id).await?;
    let result = state
        .order_service
        .update_status(UpdateOrderStatus {
            order_id,
            target,
            tracking_number: req.tracking_number,
            reason: req.reason,
        })
        .await?;
    Ok(ApiResponse::ok(
        messages::ORDER_STATUS_UPDATED,
        OrderResponse::from(&result.aggregate),
    ))
}

/// PUT /orders/{id}/ship — ship a paid, processing order.
#[tracing::instrument(skip(state, req))]
pub async fn ship<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ShipRequest>,
) -> Result<ApiResponse<OrderResponse>, ApiError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let result = state
        .order_service
        .ship(ShipOrder::new(order_id, req.tracking_number))
        .await?;
    Ok(ApiResponse::ok(
        messages::ORDER_SHIPPED,
        OrderResponse::from(&result.aggregate),
    ))
}

/// PUT /orders/{id}/deliver — mark a shipped order delivered.
#[tracing::instrument(skip(state))]
pub async fn deliver<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<OrderResponse>, ApiError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let result = state.order_service.deliver(order_id).await?;
    Ok(ApiResponse::ok(
        messages::ORDER_DELIVERED,
        OrderResponse::from(&result.aggregate),
    ))
}

/// PUT /orders/{id}/cancel — cancel a pending or confirmed order.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    OptionalJson(req): OptionalJson<CancelRequest>,
) -> Result<ApiResponse<OrderResponse>, ApiError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let reason = req.unwrap_or_default().reason;
    let result = state
        .order_service
        .cancel(CancelOrder { order_id, reason })
        .await?;
    Ok(ApiResponse::ok(
        messages::ORDER_CANCELLED,
        OrderResponse::from(&result.aggregate),
    ))
}

/// Resolves a UUID, display id, or order number to the order's id.
pub(crate) async fn resolve_order_id<S: RecordStore + Clone + 'static>(
    state: &AppState<S>,
    reference: &str,
) -> Result<AggregateId, ApiError> {
    let order = state.order_service.get_by_reference(reference).await?;
    order
        .id()
        .ok_or_else(|| ApiError::Internal(format!("order {reference} was stored without an id")))
}
