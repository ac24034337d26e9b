//! Ingress path for hookrelay: signature verification, payload
//! normalization, and the pipeline that orchestrates both in front of
//! the store.
//!
//! One [`RawDelivery`] enters [`IngressPipeline::process`] and leaves as
//! either an accepted receipt (envelope persisted, possibly a duplicate)
//! or a rejection with a stable reason code. The pipeline never retries:
//! the event source redelivers on non-2xx responses, and the store's
//! idempotent `put` makes those redeliveries harmless.
//!
//! [`RawDelivery`]: hookrelay_types::RawDelivery

mod normalize;
mod pipeline;
mod signature;

pub use normalize::{normalize, parse_body, MalformedPayload, DEFAULT_MAX_BODY_BYTES};
pub use pipeline::{IngestError, IngestReceipt, IngressPipeline, StorageFailure};
pub use signature::verify_signature;
