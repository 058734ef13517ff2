//! HTTP API server with observability for the slot reservation system.
//!
//! Exposes the booking service over REST, with structured logging (tracing)
//! and Prometheus metrics. The caller is identified by the `x-user-id`
//! header set by the upstream auth layer.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod seed;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use booking::BookingService;
use common::RetryPolicy;
use ledger::{BookingLedger, InMemoryBookingLedger, PostgresBookingLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation::{
    CompensationJournal, EngineConfig, InMemoryCompensationJournal, InMemoryDirectory,
    PostgresCompensationJournal, PostgresDirectory, ReservationEngine,
};
use slot_store::{InMemorySlotStore, PostgresSlotStore, SlotStore};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::health::HealthInfo;
pub use state::AppState;

pub type InMemoryState =
    AppState<InMemorySlotStore, InMemoryBookingLedger, InMemoryCompensationJournal>;

pub type PostgresState =
    AppState<PostgresSlotStore, PostgresBookingLedger, PostgresCompensationJournal>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, L, J>(
    state: Arc<AppState<S, L, J>>,
    metrics_handle: PrometheusHandle,
    storage: &'static str,
) -> Router
where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let health_router = Router::new()
        .route("/health", get(routes::health::check))
        .with_state(HealthInfo { storage });

    Router::new()
        .route("/bookings", post(routes::bookings::create::<S, L, J>))
        .route("/bookings/my", get(routes::bookings::list_mine::<S, L, J>))
        .route(
            "/bookings/{id}/cancel",
            patch(routes::bookings::cancel::<S, L, J>),
        )
        .route("/slots/{id}", get(routes::slots::get::<S, L, J>))
        .route(
            "/services/{id}/slots",
            get(routes::slots::available::<S, L, J>),
        )
        .with_state(state)
        .merge(health_router)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-memory state plus the handles needed to seed it.
pub struct InMemoryStores {
    pub state: Arc<InMemoryState>,
    pub slots: InMemorySlotStore,
    pub directory: InMemoryDirectory,
}

/// Creates application state backed by in-memory stores.
pub fn create_in_memory_state(retry: RetryPolicy) -> InMemoryStores {
    let slots = InMemorySlotStore::new();
    let directory = InMemoryDirectory::new();
    let engine = ReservationEngine::new(
        slots.clone(),
        InMemoryBookingLedger::new(),
        InMemoryCompensationJournal::new(),
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
    )
    .with_config(engine_config(retry));

    InMemoryStores {
        state: Arc::new(AppState::new(BookingService::new(engine))),
        slots,
        directory,
    }
}

/// Creates application state backed by PostgreSQL.
pub fn create_postgres_state(pool: PgPool, retry: RetryPolicy) -> Arc<PostgresState> {
    let directory = Arc::new(PostgresDirectory::new(pool.clone()));
    let engine = ReservationEngine::new(
        PostgresSlotStore::new(pool.clone()),
        PostgresBookingLedger::new(pool.clone()),
        PostgresCompensationJournal::new(pool),
        directory.clone(),
        directory,
    )
    .with_config(engine_config(retry));

    Arc::new(AppState::new(BookingService::new(engine)))
}

fn engine_config(retry: RetryPolicy) -> EngineConfig {
    EngineConfig {
        retry,
        ..EngineConfig::default()
    }
}
