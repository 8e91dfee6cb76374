//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use domain::{InMemoryProductCatalog, Money, ProductSnapshot};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{InMemoryWalletGateway, WalletReconciler};
use store::{InMemoryRecordStore, PostgresRecordStore, RecordStore};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Products available to the dev server; the catalog itself is managed elsewhere.
async fn demo_catalog(config: &Config) -> InMemoryProductCatalog {
    let catalog = InMemoryProductCatalog::new();
    let currency = config.default_currency.clone();
    catalog
        .upsert(
            ProductSnapshot::new("P-1001", "Electric Kettle", Money::from_minor(1_500_000), currency.clone())
                .with_name_ar("غلاية كهربائية")
                .with_sku("KET-1001"),
        )
        .await;
    catalog
        .upsert(
            ProductSnapshot::new("P-1002", "Ceramic Mug", Money::from_minor(250_000), currency)
                .with_name_ar("كوب خزفي")
                .with_sku("MUG-1002"),
        )
        .await;
    catalog
}

/// Runs the wallet recovery sweep every `period`.
fn spawn_recovery_sweep<S: RecordStore + Clone + 'static>(
    reconciler: WalletReconciler<S>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match reconciler.recover().await {
                Ok(report) if report.examined > 0 => {
                    tracing::info!(
                        examined = report.examined,
                        settled = report.settled,
                        orphaned = report.orphaned,
                        errors = report.errors,
                        "wallet recovery sweep finished"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "wallet recovery sweep failed"),
            }
        }
    })
}

async fn serve<S: RecordStore + Clone + 'static>(
    store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    let catalog = Arc::new(demo_catalog(&config).await);
    let gateway =
        Arc::new(InMemoryWalletGateway::new().with_latency(config.wallet_gateway_latency));
    let state = api::create_state(store, catalog, gateway, &config);

    let sweep = config.recovery_sweep_interval.map(|period| {
        tracing::info!(period_secs = period.as_secs(), "wallet recovery sweep enabled");
        spawn_recovery_sweep(state.payment_service.reconciler().clone(), period)
    });

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(sweep) = sweep {
        sweep.abort();
    }
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the record store and serve
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresRecordStore::connect(&url)
                .await
                .expect("failed to connect to Postgres");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using Postgres record store");
            serve(store, config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, keeping records in memory");
            serve(InMemoryRecordStore::new(), config, metrics_handle).await;
        }
    }
}
