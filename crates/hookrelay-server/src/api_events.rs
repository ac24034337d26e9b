//! Agent-facing event query handlers.
//!
//! Provides:
//! - `GET /api/events` — filtered retrieval, newest first
//! - `GET /api/events/stats` — aggregate store statistics
//! - `GET /api/events/{deliveryId}` — single-envelope lookup
//! - `GET /events/stream` — SSE stream of freshly accepted envelopes

use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    Json,
};
use futures_util::Stream;
use hookrelay_store::{QueryError, RecentEventsParams};
use hookrelay_types::{EventEnvelope, StoreStatistics};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter by event type (e.g. `issues`, `push`).
    pub event_type: Option<String>,
    /// Filter by repository full name (exact match).
    pub repository: Option<String>,
    /// Return events ingested at or after this RFC 3339 timestamp.
    pub since: Option<String>,
    /// Maximum number of events to return (capped at 100).
    pub limit: Option<i64>,
}

/// Response wrapper for `GET /api/events`.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// The number of events returned.
    pub count: usize,
    /// Matching envelopes, newest first.
    pub events: Vec<EventEnvelope>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn query_error_response(error: QueryError) -> ApiError {
    match error {
        QueryError::InvalidQuery(detail) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_query", "detail": detail })),
        ),
        other => {
            tracing::error!(error = %other, "event query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal" })),
            )
        }
    }
}

fn join_error_response(error: tokio::task::JoinError) -> ApiError {
    tracing::error!(error = %error, "query task failed to complete");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal" })),
    )
}

/// GET /api/events
pub async fn get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let query = state.query.clone();
    let request = RecentEventsParams {
        event_type: params.event_type,
        repository: params.repository,
        since: params.since,
        limit: params.limit,
    };

    let events = tokio::task::spawn_blocking(move || query.recent_events(&request))
        .await
        .map_err(join_error_response)?
        .map_err(query_error_response)?;

    Ok(Json(EventsResponse {
        count: events.len(),
        events,
    }))
}

/// GET /api/events/stats
pub async fn get_stats_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<StoreStatistics>, ApiError> {
    let query = state.query.clone();

    let stats = tokio::task::spawn_blocking(move || query.stats())
        .await
        .map_err(join_error_response)?
        .map_err(query_error_response)?;

    Ok(Json(stats))
}

/// GET /api/events/{deliveryId}
pub async fn get_event_by_id_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(delivery_id): Path<String>,
) -> Result<Json<EventEnvelope>, ApiError> {
    let query = state.query.clone();
    let lookup_id = delivery_id.clone();

    let envelope = tokio::task::spawn_blocking(move || query.event_by_id(&lookup_id))
        .await
        .map_err(join_error_response)?
        .map_err(query_error_response)?;

    match envelope {
        Some(envelope) => Ok(Json(envelope)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found", "delivery_id": delivery_id })),
        )),
    }
}

/// Query parameters for `GET /events/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Only stream envelopes with this event type.
    pub event_type: Option<String>,
}

/// GET /events/stream
///
/// Streams envelopes accepted after the connection was opened. A
/// subscriber that lags past the channel capacity silently loses the
/// overwritten events; the durable store remains the source of truth.
pub async fn get_event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let type_filter = params.event_type;

    let rx = state.events_tx.subscribe();
    let stream = BroadcastStream::new(rx);

    let mapped_stream = stream.filter_map(move |result| match result {
        Ok(envelope) => {
            if let Some(ref wanted) = type_filter {
                if envelope.event_type != *wanted {
                    return None;
                }
            }

            match serde_json::to_string(&envelope) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    tracing::error!("failed to serialize envelope for SSE: {}", e);
                    None
                }
            }
        }
        Err(broadcast_error) => {
            tracing::warn!(
                error = %broadcast_error,
                "event SSE stream lagged; envelopes were dropped for this subscriber"
            );
            None
        }
    });

    Sse::new(mapped_stream).keep_alive(KeepAlive::default())
}
