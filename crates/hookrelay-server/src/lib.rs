//! hookrelay server library logic.

pub mod api_events;
pub mod api_ingress;
pub mod config;
pub mod retention;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use hookrelay_db::DbPool;
use hookrelay_ingest::IngressPipeline;
use hookrelay_store::QueryService;
use hookrelay_types::EventEnvelope;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Maximum request body size accepted by the HTTP layer (2 MiB).
///
/// Deliberately larger than the pipeline's own 1 MiB cap so that the
/// oversized-payload rejection comes from the pipeline (as
/// `malformed_payload`) rather than from the framework.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Capacity of the live event broadcast channel. Slow SSE subscribers
/// that fall further behind than this lose events rather than applying
/// backpressure to the ingress path.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Ingress pipeline handling inbound webhook deliveries.
    pub pipeline: IngressPipeline,
    /// Read-only query service for the agent-facing API.
    pub query: QueryService,
    /// Broadcast channel carrying freshly accepted envelopes to SSE
    /// subscribers.
    pub events_tx: broadcast::Sender<EventEnvelope>,
}

impl AppState {
    /// Assembles the shared state from a pool, the webhook secret, and
    /// the pipeline body cap.
    pub fn new(pool: DbPool, secret: impl Into<String>, max_body_bytes: usize) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline: IngressPipeline::new(pool.clone(), secret)
                .with_max_body_bytes(max_body_bytes),
            query: QueryService::new(pool.clone()),
            pool,
            events_tx,
        }
    }
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load
/// balancers, monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(api_ingress::receive_webhook_handler))
        .route("/api/events", get(api_events::get_events_handler))
        .route("/api/events/stats", get(api_events::get_stats_handler))
        .route(
            "/api/events/{deliveryId}",
            get(api_events::get_event_by_id_handler),
        )
        .route("/events/stream", get(api_events::get_event_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
