//! HTTP API server for the order and payment lifecycle.
//!
//! Provides REST endpoints for orders and payments wrapped in a bilingual
//! (English/Arabic) response envelope, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{AmountCalculator, OrderService, ProductCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{PaymentService, WalletGateway};
use store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route("/orders/{id}/ship", put(routes::orders::ship::<S>))
        .route("/orders/{id}/deliver", put(routes::orders::deliver::<S>))
        .route("/orders/{id}/cancel", put(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/payments",
            get(routes::payments::list_for_order::<S>),
        )
        .route("/payments", post(routes::payments::create::<S>))
        .route("/payments/stats", get(routes::payments::stats::<S>))
        .route("/payments/reconcile", post(routes::payments::reconcile::<S>))
        .route("/payments/{id}", get(routes::payments::get::<S>))
        .route("/payments/{id}/events", get(routes::payments::events::<S>))
        .route("/payments/{id}/confirm", put(routes::payments::confirm::<S>))
        .route("/payments/{id}/reject", put(routes::payments::reject::<S>))
        .route("/payments/{id}/refund", put(routes::payments::refund::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the order and payment services over one record store.
pub fn create_state<S: RecordStore + Clone + 'static>(
    store: S,
    catalog: Arc<dyn ProductCatalog>,
    gateway: Arc<dyn WalletGateway>,
    config: &Config,
) -> Arc<AppState<S>> {
    let order_service = OrderService::new(
        store.clone(),
        catalog,
        AmountCalculator::from(config.pricing()),
    )
    .with_default_currency(config.default_currency.clone());
    let payment_service =
        PaymentService::new(store, order_service.clone(), gateway, config.reconciler());

    Arc::new(AppState {
        order_service,
        payment_service,
    })
}
