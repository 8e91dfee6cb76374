//! Payment endpoints: creation, manual transitions, lookups, and reconciliation.
//!
//! Creating an e-wallet payment answers `202 Accepted` with the payment in
//! `PROCESSING`: the gateway call runs in the background and may still fail.
//! Clients follow the outcome with `GET /payments/{id}`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Aggregate, CreatePayment, Currency, DomainError, Money, Payment, PaymentMethod, PaymentStatus,
    WalletFailureKind, WalletTransaction, WalletType,
};
use payments::{RecoveryReport, StatusSummary};
use serde::{Deserialize, Serialize};
use store::RecordStore;

use crate::error::ApiError;
use crate::extract::{ApiJson, OptionalJson};
use crate::response::{ApiResponse, messages};
use crate::routes::AppState;
use crate::routes::orders::{EventResponse, resolve_order_id};

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// UUID, display id, or order number of the order being paid.
    pub order_id: String,
    pub payment_method: String,
    pub amount: Money,
    pub currency: Option<String>,
    pub wallet_phone: Option<String>,
    pub bank_reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub gateway_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectPaymentRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub display_id: String,
    pub transaction_id: String,
    pub gateway_transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_gateway: String,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub version: i64,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_transaction: Option<WalletTransactionResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransactionResponse {
    pub id: String,
    pub display_id: String,
    pub transaction_reference: String,
    pub wallet_transaction_id: Option<String>,
    pub wallet_type: WalletType,
    pub wallet_phone: String,
    pub amount: Money,
    pub fees: Money,
    pub status: PaymentStatus,
    pub failure_kind: Option<WalletFailureKind>,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResponse {
    pub examined: usize,
    pub settled: usize,
    pub orphaned: usize,
    pub errors: usize,
}

impl PaymentResponse {
    fn new(payment: &Payment, wallet: Option<&WalletTransaction>) -> Self {
        Self {
            id: payment.id().map(|id| id.to_string()).unwrap_or_default(),
            display_id: payment.display_id().to_string(),
            transaction_id: payment.transaction_id().to_string(),
            gateway_transaction_id: payment.gateway_transaction_id().map(String::from),
            order_id: payment.order_id().map(|id| id.to_string()),
            payment_method: payment.payment_method(),
            payment_gateway: payment.payment_gateway().to_string(),
            amount: payment.amount(),
            currency: payment.currency().to_string(),
            status: payment.status(),
            failure_reason: payment.failure_reason().map(String::from),
            refund_reason: payment.refund_reason().map(String::from),
            cancellation_reason: payment.cancellation_reason().map(String::from),
            version: payment.version().as_i64(),
            processed_at: payment.processed_at(),
            refunded_at: payment.refunded_at(),
            cancelled_at: payment.cancelled_at(),
            created_at: payment.created_at(),
            updated_at: payment.updated_at(),
            wallet_transaction: wallet.map(WalletTransactionResponse::from),
        }
    }
}

impl From<&WalletTransaction> for WalletTransactionResponse {
    fn from(wallet: &WalletTransaction) -> Self {
        Self {
            id: wallet.id().map(|id| id.to_string()).unwrap_or_default(),
            display_id: wallet.display_id().to_string(),
            transaction_reference: wallet.transaction_reference().to_string(),
            wallet_transaction_id: wallet.wallet_transaction_id().map(String::from),
            wallet_type: wallet.wallet_type(),
            wallet_phone: wallet.wallet_phone().to_string(),
            amount: wallet.amount(),
            fees: wallet.fees(),
            status: wallet.status(),
            failure_kind: wallet.failure_kind(),
            error_message: wallet.error_message().map(String::from),
            created_at: wallet.created_at(),
            completed_at: wallet.completed_at(),
        }
    }
}

impl From<RecoveryReport> for ReconciliationResponse {
    fn from(report: RecoveryReport) -> Self {
        Self {
            examined: report.examined,
            settled: report.settled,
            orphaned: report.orphaned,
            errors: report.errors,
        }
    }
}

// -- Handlers --

/// POST /payments — create a payment and dispatch it by method.
#[tracing::instrument(skip(state, req), fields(order = %req.order_id, method = %req.payment_method))]
pub async fn create<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let method: PaymentMethod = req.payment_method.parse().map_err(DomainError::from)?;
    let currency = req
        .currency
        .as_deref()
        .map(Currency::parse)
        .transpose()
        .map_err(DomainError::from)?;
    let order_id = resolve_order_id(&state, &req.order_id).await?;

    let cmd = CreatePayment {
        order_id,
        payment_method: method,
        amount: req.amount,
        currency,
        wallet_phone: req.wallet_phone,
        bank_reference: req.bank_reference,
    };
    // The reconciliation task keeps running after its handle is dropped.
    let created = state.payment_service.create_payment(cmd).await?;
    let body = PaymentResponse::new(&created.payment, created.wallet_transaction.as_ref());

    if method.is_wallet() {
        Ok(ApiResponse::ok(messages::PAYMENT_ACCEPTED, body).with_status(StatusCode::ACCEPTED))
    } else {
        Ok(ApiResponse::created(messages::PAYMENT_CREATED, body))
    }
}

/// GET /payments/{id} — look a payment up by UUID, display id, or transaction id.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let payment = state.payment_service.get_by_reference(&id).await?;
    let response = with_wallet(&state, &payment).await?;
    Ok(ApiResponse::ok(messages::PAYMENT_RETRIEVED, response))
}

/// GET /orders/{id}/payments — every payment attempt for an order, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list_for_order<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<PaymentResponse>>, ApiError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let payments = state.payment_service.list_by_order(order_id).await?;

    let mut responses = Vec::with_capacity(payments.len());
    for payment in &payments {
        responses.push(with_wallet(&state, payment).await?);
    }
    Ok(ApiResponse::ok(messages::PAYMENTS_RETRIEVED, responses))
}

/// GET /payments/{id}/events — the payment's audit log, oldest first.
#[tracing::instrument(skip(state))]
pub async fn events<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<EventResponse>>, ApiError> {
    let payment_id = resolve_payment_id(&state, &id).await?;
    let envelopes = state.payment_service.history(payment_id).await?;
    Ok(ApiResponse::ok(
        messages::PAYMENT_RETRIEVED,
        envelopes.into_iter().map(EventResponse::from).collect(),
    ))
}

/// PUT /payments/{id}/confirm — record collection of a pending payment.
#[tracing::instrument(skip(state, req))]
pub async fn confirm<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    OptionalJson(req): OptionalJson<ConfirmPaymentRequest>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let payment_id = resolve_payment_id(&state, &id).await?;
    let result = state
        .payment_service
        .confirm_payment(payment_id, req.unwrap_or_default().gateway_transaction_id)
        .await?;
    let response = with_wallet(&state, &result.aggregate).await?;
    Ok(ApiResponse::ok(messages::PAYMENT_CONFIRMED, response))
}

/// PUT /payments/{id}/reject — fail a payment that hasn't finished.
#[tracing::instrument(skip(state, req))]
pub async fn reject<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RejectPaymentRequest>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest("Rejection reason is required".to_string()));
    }
    let payment_id = resolve_payment_id(&state, &id).await?;
    let result = state
        .payment_service
        .reject_payment(payment_id, reason.to_string())
        .await?;
    let response = with_wallet(&state, &result.aggregate).await?;
    Ok(ApiResponse::ok(messages::PAYMENT_REJECTED, response))
}

/// PUT /payments/{id}/refund — refund a completed payment.
#[tracing::instrument(skip(state, req))]
pub async fn refund<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    OptionalJson(req): OptionalJson<ReasonRequest>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let payment_id = resolve_payment_id(&state, &id).await?;
    let result = state
        .payment_service
        .refund_payment(payment_id, req.unwrap_or_default().reason)
        .await?;
    let response = with_wallet(&state, &result.aggregate).await?;
    Ok(ApiResponse::ok(messages::PAYMENT_REFUNDED, response))
}

/// GET /payments/stats — count and total per payment status.
#[tracing::instrument(skip(state))]
pub async fn stats<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<ApiResponse<Vec<StatusSummary>>, ApiError> {
    let stats = state.payment_service.stats().await?;
    Ok(ApiResponse::ok(messages::PAYMENT_STATS_RETRIEVED, stats))
}

/// POST /payments/reconcile — run the wallet recovery sweep once.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<ApiResponse<ReconciliationResponse>, ApiError> {
    let report = state.payment_service.reconciler().recover().await?;
    Ok(ApiResponse::ok(
        messages::RECONCILIATION_FINISHED,
        ReconciliationResponse::from(report),
    ))
}

async fn resolve_payment_id<S: RecordStore + Clone + 'static>(
    state: &AppState<S>,
    reference: &str,
) -> Result<AggregateId, ApiError> {
    let payment = state.payment_service.get_by_reference(reference).await?;
    payment
        .id()
        .ok_or_else(|| ApiError::Internal(format!("payment {reference} was stored without an id")))
}

async fn with_wallet<S: RecordStore + Clone + 'static>(
    state: &AppState<S>,
    payment: &Payment,
) -> Result<PaymentResponse, ApiError> {
    let wallet = match payment.id() {
        Some(payment_id) if payment.payment_method().is_wallet() => {
            state.payment_service.wallet_for_payment(payment_id).await?
        }
        _ => None,
    };
    Ok(PaymentResponse::new(payment, wallet.as_ref()))
}
