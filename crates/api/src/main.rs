//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, create_app};
use ledger::BookingLedger;
use reservation::CompensationJournal;
use slot_store::{PostgresSlotStore, SlotStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
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
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Re-runs compensations left open by a previous process, then serves
/// until a shutdown signal arrives.
async fn serve<S, L, J>(
    config: &Config,
    state: Arc<AppState<S, L, J>>,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    storage: &'static str,
) where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    match state.bookings.resume_pending_compensations().await {
        Ok(report) => tracing::info!(
            applied = report.applied,
            skipped = report.skipped,
            escalated = report.escalated,
            "resumed open compensations"
        ),
        Err(err) => tracing::error!(error = %err, "could not resume open compensations"),
    }

    let app = create_app(state, metrics_handle, storage);

    let addr = config.addr();
    tracing::info!(%addr, storage, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build the stores and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");

            PostgresSlotStore::new(pool.clone())
                .run_migrations()
                .await
                .expect("failed to run migrations");

            let state = api::create_postgres_state(pool.clone(), config.retry_policy());
            serve(&config, state, metrics_handle, "postgres").await;

            pool.close().await;
        }
        None => {
            let stores = api::create_in_memory_state(config.retry_policy());
            if config.seed_demo_data {
                api::seed::seed_demo_data(&stores.slots, &stores.directory, chrono::Utc::now())
                    .await
                    .expect("failed to seed demo data");
            }
            serve(&config, stores.state, metrics_handle, "memory").await;
        }
    }

    tracing::info!("server shut down gracefully");
}
