//! Webhook ingress handler.
//!
//! `POST /webhook` is the single entry point the event source delivers
//! to. The handler only adapts HTTP to the ingress pipeline: it lifts
//! the raw bytes and the three GitHub headers into a
//! [`RawDelivery`](hookrelay_types::RawDelivery), runs the pipeline on a
//! blocking thread, and maps the outcome to a status code. All
//! verification and validation decisions live in the pipeline.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use hookrelay_types::{RawDelivery, RejectReason};
use serde_json::json;
use std::sync::Arc;

/// Header carrying the HMAC signature of the body.
const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header carrying the event category.
const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the unique delivery id.
const DELIVERY_HEADER: &str = "x-github-delivery";

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// POST /webhook
///
/// Status mapping: accepted (including duplicates) → 200;
/// `invalid_signature` / `malformed_payload` → 400; `storage_failure`
/// → 500. The source redelivers on non-2xx, so a duplicate must be a
/// 200, otherwise the source would retry forever.
pub async fn receive_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let raw = RawDelivery {
        body: body.to_vec(),
        signature_header: header_string(&headers, SIGNATURE_HEADER),
        event_type: header_string(&headers, EVENT_HEADER).unwrap_or_else(|| "unknown".to_string()),
        delivery_id: header_string(&headers, DELIVERY_HEADER)
            .unwrap_or_else(|| "unknown".to_string()),
    };

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.process(&raw)).await;

    let result = match result {
        Ok(result) => result,
        Err(join_error) => {
            tracing::error!(error = %join_error, "ingress task failed to complete");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": RejectReason::StorageFailure })),
            );
        }
    };

    match result {
        Ok(receipt) => {
            // Broadcast fresh envelopes to SSE subscribers; duplicates
            // were already announced when first accepted.
            if !receipt.is_duplicate() {
                let _ = state.events_tx.send(receipt.envelope.clone());
            }
            (
                StatusCode::OK,
                Json(json!({
                    "status": "accepted",
                    "delivery_id": receipt.envelope.delivery_id,
                    "duplicate": receipt.is_duplicate(),
                })),
            )
        }
        Err(error) => {
            let reason = error.reject_reason();
            let status = match reason {
                RejectReason::InvalidSignature | RejectReason::MalformedPayload => {
                    StatusCode::BAD_REQUEST
                }
                RejectReason::StorageFailure => {
                    // The one outcome worth operational alerting.
                    tracing::error!(error = %error, "durable write failed for inbound delivery");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Json(json!({ "error": reason })))
        }
    }
}
