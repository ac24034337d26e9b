//! Shared types and error definitions for the hookrelay workspace.
//!
//! This crate provides the data model used across all hookrelay crates:
//! the raw inbound delivery, the normalized event envelope that gets
//! persisted, and the derived store statistics.
//!
//! No crate in the workspace depends on anything *except* `hookrelay-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One inbound webhook delivery, exactly as received.
///
/// `body` holds the raw request bytes. Signature verification runs over
/// these bytes and they must never be re-serialized beforehand. The three
/// string fields come from the `X-Hub-Signature-256`, `X-GitHub-Event`,
/// and `X-GitHub-Delivery` headers respectively.
#[derive(Debug, Clone)]
pub struct RawDelivery {
    /// Raw request body bytes.
    pub body: Vec<u8>,
    /// Value of the `X-Hub-Signature-256` header, if present.
    pub signature_header: Option<String>,
    /// Source-declared event category (e.g. `issues`, `push`).
    pub event_type: String,
    /// Source-declared unique identifier for this delivery attempt.
    pub delivery_id: String,
}

/// Repository reference extracted from a webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Sender (the user who triggered the event) reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

/// Organization reference, present on org-scoped events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

/// The canonical, persisted representation of one accepted delivery.
///
/// Envelopes are immutable after creation. Every persisted envelope has
/// passed signature verification and normalization; unverified data never
/// reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event category, copied verbatim from the delivery headers.
    pub event_type: String,
    /// Primary key. Unique across the store's lifetime; the source reuses
    /// it when redelivering, which is what makes `put` idempotent.
    pub delivery_id: String,
    /// Ingestion time (UTC), not any source-reported time.
    pub received_at: DateTime<Utc>,
    /// Sub-action reported inside the payload (e.g. `opened`, `closed`).
    /// Empty string when the event type carries no action.
    #[serde(default)]
    pub action: String,
    /// Repository context, absent for org-level events without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationRef>,
    /// The full parsed body, stored as-is. No fields are stripped, so
    /// event shapes the normalizer does not specifically understand
    /// survive round trips.
    pub payload: serde_json::Value,
}

/// Aggregate statistics over the store, derived at call time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    /// Number of envelopes in the store.
    pub total_events: u64,
    /// Ingestion timestamp of the oldest envelope, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest: Option<DateTime<Utc>>,
    /// Ingestion timestamp of the newest envelope, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<DateTime<Utc>>,
    /// Envelope counts keyed by event type.
    pub events_by_type: BTreeMap<String, u64>,
    /// Number of distinct repository full names seen.
    pub unique_repositories: u64,
    /// Sorted distinct repository full names.
    pub repositories: Vec<String>,
}

impl StoreStatistics {
    /// Statistics for an empty store.
    pub fn empty() -> Self {
        Self {
            total_events: 0,
            earliest: None,
            latest: None,
            events_by_type: BTreeMap::new(),
            unique_repositories: 0,
            repositories: Vec::new(),
        }
    }
}

/// Stable machine-readable reason codes for rejected deliveries.
///
/// These are the only codes callers ever see; no internal detail (stack
/// state, secret material) is attached to a caller-visible rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The MAC did not verify, or the signature header was absent or
    /// malformed.
    InvalidSignature,
    /// The body was not parseable JSON, or exceeded the size cap.
    MalformedPayload,
    /// The durable write failed. The only reason that warrants
    /// operational alerting.
    StorageFailure,
}

impl RejectReason {
    /// Returns the canonical string code for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedPayload => "malformed_payload",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_without_absent_refs() {
        let envelope = EventEnvelope {
            event_type: "ping".to_string(),
            delivery_id: "d-1".to_string(),
            received_at: Utc::now(),
            action: String::new(),
            repository: None,
            sender: None,
            organization: None,
            payload: serde_json::json!({"zen": "Keep it logically awesome."}),
        };

        let value = serde_json::to_value(&envelope).expect("should serialize");
        assert!(value.get("repository").is_none());
        assert!(value.get("sender").is_none());
        assert!(value.get("organization").is_none());
        assert_eq!(value["event_type"], "ping");
        assert_eq!(value["action"], "");
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = EventEnvelope {
            event_type: "issues".to_string(),
            delivery_id: "d-2".to_string(),
            received_at: "2025-06-01T12:00:00Z".parse().expect("valid timestamp"),
            action: "opened".to_string(),
            repository: Some(RepositoryRef {
                id: Some(42),
                name: Some("hookrelay".to_string()),
                full_name: Some("acme/hookrelay".to_string()),
                url: Some("https://github.com/acme/hookrelay".to_string()),
            }),
            sender: Some(SenderRef {
                login: Some("octocat".to_string()),
                id: Some(1),
            }),
            organization: None,
            payload: serde_json::json!({"action": "opened", "issue": {"number": 7}}),
        };

        let json = serde_json::to_string(&envelope).expect("should serialize");
        let restored: EventEnvelope = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(restored, envelope);
    }

    #[test]
    fn reject_reason_codes_are_stable() {
        assert_eq!(RejectReason::InvalidSignature.as_str(), "invalid_signature");
        assert_eq!(RejectReason::MalformedPayload.as_str(), "malformed_payload");
        assert_eq!(RejectReason::StorageFailure.as_str(), "storage_failure");
        assert_eq!(
            serde_json::to_value(RejectReason::InvalidSignature).expect("serialize"),
            serde_json::json!("invalid_signature")
        );
    }
}
