//! Payload normalization: raw delivery + parsed body → [`EventEnvelope`].
//!
//! Normalization is total for any well-formed JSON document under the
//! size cap. The header-declared `delivery_id` and `event_type` are
//! authoritative over anything inside the body, and the sub-object
//! extraction is best effort: a payload with no `repository` object is
//! not an error, it is an envelope without a repository.

use chrono::Utc;
use hookrelay_types::{
    EventEnvelope, OrganizationRef, RawDelivery, RepositoryRef, SenderRef,
};
use serde_json::Value;
use thiserror::Error;

/// Default cap on the raw body size (1 MiB). Bounds memory use per
/// request; not a business-content validation.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Why a body could not be turned into a parsed document.
#[derive(Debug, Error)]
pub enum MalformedPayload {
    /// The body exceeds the configured size cap.
    #[error("payload of {actual} bytes exceeds the {limit} byte cap")]
    Oversized {
        /// The configured cap.
        limit: usize,
        /// The size of the rejected body.
        actual: usize,
    },

    /// The body is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses raw body bytes into a JSON document, enforcing the size cap.
///
/// # Errors
///
/// Returns [`MalformedPayload`] when the body is oversized or not valid
/// JSON, the only two ways normalization can fail.
pub fn parse_body(body: &[u8], max_bytes: usize) -> Result<Value, MalformedPayload> {
    if body.len() > max_bytes {
        return Err(MalformedPayload::Oversized {
            limit: max_bytes,
            actual: body.len(),
        });
    }
    Ok(serde_json::from_slice(body)?)
}

/// Builds the canonical envelope from a delivery and its parsed body.
///
/// `delivery_id` and `event_type` are copied verbatim from the delivery
/// headers. The envelope timestamp is the ingestion instant (UTC), not
/// any time reported by the source. The parsed body is stored as-is in
/// `payload`; nothing is stripped.
pub fn normalize(raw: &RawDelivery, body: Value) -> EventEnvelope {
    EventEnvelope {
        event_type: raw.event_type.clone(),
        delivery_id: raw.delivery_id.clone(),
        received_at: Utc::now(),
        action: extract_action(&body),
        repository: extract_repository(&body),
        sender: extract_sender(&body),
        organization: extract_organization(&body),
        payload: body,
    }
}

/// Top-level `"action"` string, or empty when the event type carries
/// none.
fn extract_action(body: &Value) -> String {
    body.get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Repository reference, present only when the body has a top-level
/// `repository` object with at least one identifying field.
fn extract_repository(body: &Value) -> Option<RepositoryRef> {
    let repo = body.get("repository")?.as_object()?;
    let reference = RepositoryRef {
        id: repo.get("id").and_then(Value::as_i64),
        name: repo.get("name").and_then(Value::as_str).map(str::to_string),
        full_name: repo
            .get("full_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: repo
            .get("html_url")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    if reference.id.is_some() || reference.full_name.is_some() || reference.name.is_some() {
        Some(reference)
    } else {
        None
    }
}

/// Sender reference, requiring an `id` or `login`.
fn extract_sender(body: &Value) -> Option<SenderRef> {
    let sender = body.get("sender")?.as_object()?;
    let reference = SenderRef {
        login: sender
            .get("login")
            .and_then(Value::as_str)
            .map(str::to_string),
        id: sender.get("id").and_then(Value::as_i64),
    };
    if reference.id.is_some() || reference.login.is_some() {
        Some(reference)
    } else {
        None
    }
}

/// Organization reference, requiring an `id` or `login`.
fn extract_organization(body: &Value) -> Option<OrganizationRef> {
    let org = body.get("organization")?.as_object()?;
    let reference = OrganizationRef {
        login: org.get("login").and_then(Value::as_str).map(str::to_string),
        id: org.get("id").and_then(Value::as_i64),
    };
    if reference.id.is_some() || reference.login.is_some() {
        Some(reference)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivery(event_type: &str, delivery_id: &str) -> RawDelivery {
        RawDelivery {
            body: Vec::new(),
            signature_header: None,
            event_type: event_type.to_string(),
            delivery_id: delivery_id.to_string(),
        }
    }

    #[test]
    fn headers_are_authoritative() {
        let body = json!({"delivery_id": "from-body", "event_type": "from-body"});
        let envelope = normalize(&delivery("issues", "abc-1"), body);
        assert_eq!(envelope.event_type, "issues");
        assert_eq!(envelope.delivery_id, "abc-1");
    }

    #[test]
    fn action_extracted_or_empty() {
        let with = normalize(&delivery("issues", "d1"), json!({"action": "opened"}));
        assert_eq!(with.action, "opened");

        let without = normalize(&delivery("push", "d2"), json!({"ref": "refs/heads/main"}));
        assert_eq!(without.action, "");

        // A non-string action is treated as absent, not an error.
        let non_string = normalize(&delivery("weird", "d3"), json!({"action": 7}));
        assert_eq!(non_string.action, "");
    }

    #[test]
    fn repository_extraction() {
        let body = json!({
            "repository": {
                "id": 42,
                "name": "widget",
                "full_name": "acme/widget",
                "html_url": "https://github.com/acme/widget"
            }
        });
        let repo = normalize(&delivery("push", "d1"), body)
            .repository
            .expect("should extract repository");
        assert_eq!(repo.id, Some(42));
        assert_eq!(repo.name.as_deref(), Some("widget"));
        assert_eq!(repo.full_name.as_deref(), Some("acme/widget"));
        assert_eq!(repo.url.as_deref(), Some("https://github.com/acme/widget"));
    }

    #[test]
    fn missing_sub_objects_are_absent_not_errors() {
        let envelope = normalize(&delivery("membership", "d1"), json!({"scope": "team"}));
        assert!(envelope.repository.is_none());
        assert!(envelope.sender.is_none());
        assert!(envelope.organization.is_none());
    }

    #[test]
    fn sub_object_without_identifying_field_is_absent() {
        let body = json!({
            "repository": {"description": "no identifying fields"},
            "sender": {"type": "User"},
            "organization": 7
        });
        let envelope = normalize(&delivery("issues", "d1"), body);
        assert!(envelope.repository.is_none());
        assert!(envelope.sender.is_none());
        assert!(envelope.organization.is_none());
    }

    #[test]
    fn partial_sub_objects_extract_what_exists() {
        let body = json!({
            "sender": {"login": "octocat"},
            "organization": {"id": 9}
        });
        let envelope = normalize(&delivery("organization", "d1"), body);
        let sender = envelope.sender.expect("login suffices");
        assert_eq!(sender.login.as_deref(), Some("octocat"));
        assert!(sender.id.is_none());
        let org = envelope.organization.expect("id suffices");
        assert_eq!(org.id, Some(9));
        assert!(org.login.is_none());
    }

    #[test]
    fn payload_is_preserved_verbatim() {
        let body = json!({
            "action": "opened",
            "issue": {"number": 5, "labels": [{"name": "bug"}]},
            "unknown_future_field": {"nested": [1, 2, 3]}
        });
        let envelope = normalize(&delivery("issues", "d1"), body.clone());
        assert_eq!(envelope.payload, body);
    }

    #[test]
    fn parse_body_accepts_any_json_document() {
        assert!(parse_body(b"{}", DEFAULT_MAX_BODY_BYTES).is_ok());
        assert!(parse_body(b"[1, 2, 3]", DEFAULT_MAX_BODY_BYTES).is_ok());
        assert!(parse_body(b"\"just a string\"", DEFAULT_MAX_BODY_BYTES).is_ok());
    }

    #[test]
    fn parse_body_rejects_invalid_json() {
        let err = parse_body(b"{not json", DEFAULT_MAX_BODY_BYTES).expect_err("should fail");
        assert!(matches!(err, MalformedPayload::Json(_)));
    }

    #[test]
    fn parse_body_rejects_oversized() {
        let body = vec![b' '; 33];
        let err = parse_body(&body, 32).expect_err("should fail");
        match err {
            MalformedPayload::Oversized { limit, actual } => {
                assert_eq!(limit, 32);
                assert_eq!(actual, 33);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_body_accepts_exactly_at_cap() {
        let body = b"[1,2,3]";
        assert!(parse_body(body, body.len()).is_ok());
    }
}
