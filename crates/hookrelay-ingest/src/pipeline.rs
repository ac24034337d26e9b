//! The ingress pipeline: verify → normalize → persist.
//!
//! Each inbound delivery moves through the states
//! `Received → Verifying → Normalizing → Persisting` and terminates as
//! accepted (with a receipt) or rejected (with an [`IngestError`] whose
//! reason code the transport maps to an HTTP status). There is no
//! internal retry; redelivery is the source's job.

use hookrelay_db::DbPool;
use hookrelay_store::{insert_event, PutOutcome, StoreError};
use hookrelay_types::{EventEnvelope, RawDelivery, RejectReason};
use thiserror::Error;

use crate::normalize::{normalize, parse_body, MalformedPayload, DEFAULT_MAX_BODY_BYTES};
use crate::signature::verify_signature;

/// Why a durable write could not be completed.
#[derive(Debug, Error)]
pub enum StorageFailure {
    /// No connection could be checked out of the pool.
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// The insert itself failed (e.g. disk full).
    #[error("durable write: {0}")]
    Write(#[from] StoreError),
}

/// Terminal rejection of one delivery.
///
/// The [`RejectReason`] is the caller-visible part; the error sources
/// carry operational detail for logs only.
#[derive(Debug, Error)]
pub enum IngestError {
    /// MAC verification failed or the signature header was missing.
    #[error("invalid signature")]
    InvalidSignature,

    /// The body could not be parsed under the size cap.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] MalformedPayload),

    /// The durable write failed. Surfaced with enough detail for
    /// operational alerting; fatal for this request only.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageFailure),
}

impl IngestError {
    /// The stable machine-readable reason code for this rejection.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            Self::InvalidSignature => RejectReason::InvalidSignature,
            Self::MalformedPayload(_) => RejectReason::MalformedPayload,
            Self::Storage(_) => RejectReason::StorageFailure,
        }
    }
}

/// Outcome of an accepted delivery.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    /// The normalized envelope. For duplicates this is the envelope
    /// built from the redelivery, not the stored record.
    pub envelope: EventEnvelope,
    /// Whether the envelope was inserted or already present.
    pub outcome: PutOutcome,
}

impl IngestReceipt {
    /// True when the delivery id was already in the store.
    pub fn is_duplicate(&self) -> bool {
        self.outcome == PutOutcome::Duplicate
    }
}

/// Orchestrates Verifier → Normalizer → Store for inbound deliveries.
///
/// Constructed once at startup with the pool handle and the shared
/// secret; cheap to clone. `process` is synchronous and is expected to
/// run on a blocking thread when called from async handlers.
#[derive(Clone)]
pub struct IngressPipeline {
    pool: DbPool,
    secret: String,
    max_body_bytes: usize,
}

impl IngressPipeline {
    /// Creates a pipeline with the default 1 MiB body cap.
    pub fn new(pool: DbPool, secret: impl Into<String>) -> Self {
        Self {
            pool,
            secret: secret.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Overrides the raw body size cap.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Runs one delivery through verify → normalize → persist.
    ///
    /// A redelivered `delivery_id` is an accepted outcome
    /// ([`IngestReceipt::is_duplicate`] is true): the source must not
    /// retry it, and the store is untouched.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`IngestError`] for this delivery. Nothing
    /// is persisted unless the delivery was fully verified and
    /// normalized.
    pub fn process(&self, raw: &RawDelivery) -> Result<IngestReceipt, IngestError> {
        // Verifying
        let verified = raw
            .signature_header
            .as_deref()
            .is_some_and(|header| verify_signature(&raw.body, header, &self.secret));
        if !verified {
            tracing::warn!(
                delivery_id = %raw.delivery_id,
                event_type = %raw.event_type,
                "rejecting delivery with missing or invalid signature"
            );
            return Err(IngestError::InvalidSignature);
        }

        // Normalizing
        let body = parse_body(&raw.body, self.max_body_bytes)?;
        let envelope = normalize(raw, body);

        // Persisting
        let conn = self.pool.get().map_err(StorageFailure::from)?;
        let outcome = insert_event(&conn, &envelope).map_err(StorageFailure::from)?;

        tracing::info!(
            delivery_id = %envelope.delivery_id,
            event_type = %envelope.event_type,
            action = %envelope.action,
            duplicate = outcome == PutOutcome::Duplicate,
            "delivery accepted"
        );

        Ok(IngestReceipt { envelope, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const SECRET: &str = "s3cr3t";

    fn sign(body: &[u8]) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("any key length works");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Pipeline over a single-connection in-memory pool, returned with
    /// the pool so tests can inspect the store directly.
    fn test_pipeline() -> (IngressPipeline, DbPool) {
        let pool = hookrelay_db::create_pool(
            ":memory:",
            hookrelay_db::DbRuntimeSettings {
                busy_timeout_ms: 1_000,
                pool_max_size: 1,
            },
        )
        .expect("pool");
        {
            let conn = pool.get().expect("conn");
            hookrelay_db::run_migrations(&conn).expect("migrations");
        }
        (IngressPipeline::new(pool.clone(), SECRET), pool)
    }

    fn issues_delivery(delivery_id: &str) -> RawDelivery {
        let body = br#"{"action":"opened","issue":{"number":7},"repository":{"id":1,"full_name":"acme/widget"}}"#.to_vec();
        let signature_header = Some(sign(&body));
        RawDelivery {
            body,
            signature_header,
            event_type: "issues".to_string(),
            delivery_id: delivery_id.to_string(),
        }
    }

    fn stored_count(pool: &DbPool) -> i64 {
        let conn = pool.get().expect("conn");
        conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn valid_delivery_is_accepted_and_persisted() {
        let (pipeline, pool) = test_pipeline();
        let receipt = pipeline
            .process(&issues_delivery("abc-1"))
            .expect("should accept");

        assert_eq!(receipt.outcome, PutOutcome::Inserted);
        assert!(!receipt.is_duplicate());
        assert_eq!(receipt.envelope.action, "opened");

        let conn = pool.get().expect("conn");
        let stored = hookrelay_store::get_event(&conn, "abc-1")
            .expect("get")
            .expect("persisted");
        assert_eq!(stored.event_type, "issues");
        assert_eq!(stored.action, "opened");
        assert_eq!(
            stored.repository.expect("repo").full_name.as_deref(),
            Some("acme/widget")
        );
    }

    #[test]
    fn tampered_signature_is_rejected_and_store_unchanged() {
        let (pipeline, pool) = test_pipeline();
        let mut raw = issues_delivery("abc-1");
        let mut header = raw.signature_header.take().expect("header").into_bytes();
        let last = header.last_mut().expect("nonempty");
        *last = if *last == b'0' { b'1' } else { b'0' };
        raw.signature_header = Some(String::from_utf8(header).expect("ascii"));

        let err = pipeline.process(&raw).expect_err("should reject");
        assert_eq!(err.reject_reason(), RejectReason::InvalidSignature);
        assert_eq!(stored_count(&pool), 0);
    }

    #[test]
    fn missing_signature_header_is_rejected() {
        let (pipeline, pool) = test_pipeline();
        let mut raw = issues_delivery("abc-1");
        raw.signature_header = None;

        let err = pipeline.process(&raw).expect_err("should reject");
        assert_eq!(err.reject_reason(), RejectReason::InvalidSignature);
        assert_eq!(stored_count(&pool), 0);
    }

    #[test]
    fn redelivery_is_accepted_without_a_second_record() {
        let (pipeline, pool) = test_pipeline();
        let raw = issues_delivery("abc-1");

        let first = pipeline.process(&raw).expect("first");
        assert_eq!(first.outcome, PutOutcome::Inserted);

        let second = pipeline.process(&raw).expect("redelivery is accepted");
        assert!(second.is_duplicate());
        assert_eq!(stored_count(&pool), 1);
    }

    #[test]
    fn unparseable_body_is_rejected_after_verification() {
        let (pipeline, pool) = test_pipeline();
        let body = b"{definitely not json".to_vec();
        let raw = RawDelivery {
            signature_header: Some(sign(&body)),
            body,
            event_type: "issues".to_string(),
            delivery_id: "abc-1".to_string(),
        };

        let err = pipeline.process(&raw).expect_err("should reject");
        assert_eq!(err.reject_reason(), RejectReason::MalformedPayload);
        assert_eq!(stored_count(&pool), 0);
    }

    #[test]
    fn oversized_body_is_rejected() {
        let (pipeline, pool) = test_pipeline();
        let pipeline = pipeline.with_max_body_bytes(16);
        let body = br#"{"padding":"xxxxxxxxxxxxxxxx"}"#.to_vec();
        let raw = RawDelivery {
            signature_header: Some(sign(&body)),
            body,
            event_type: "push".to_string(),
            delivery_id: "big-1".to_string(),
        };

        let err = pipeline.process(&raw).expect_err("should reject");
        assert_eq!(err.reject_reason(), RejectReason::MalformedPayload);
        assert_eq!(stored_count(&pool), 0);
    }

    #[test]
    fn wrong_secret_rejects_valid_shape() {
        let (pipeline, _pool) = test_pipeline();
        let mut raw = issues_delivery("abc-1");
        // Re-sign with a different secret; header shape stays valid.
        let mut mac = Hmac::<Sha256>::new_from_slice(b"other-secret").expect("key");
        mac.update(&raw.body);
        raw.signature_header = Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())));

        let err = pipeline.process(&raw).expect_err("should reject");
        assert_eq!(err.reject_reason(), RejectReason::InvalidSignature);
    }
}
