//! Durable event store and read-only query service for hookrelay.
//!
//! The store holds normalized [`EventEnvelope`]s keyed by `delivery_id`.
//! It is append-mostly: envelopes are never updated in place, and rows are
//! only removed by the optional retention cap. All writes go through
//! [`insert_event`], which is idempotent: redelivering the same
//! `delivery_id` is a no-op reported as [`PutOutcome::Duplicate`].
//!
//! Reads go through [`get_event`], [`query_events`] (filtered,
//! newest-first), and [`event_stats`] (aggregates recomputed at call
//! time). [`QueryService`] wraps these for the agent-facing transport,
//! adding caller-input validation and the hard `limit` cap.
//!
//! Concurrency relies on the database layer: SQLite in WAL mode gives a
//! single writer with concurrent readers, so a `query` observes either
//! the pre- or post-state of any `put`, never a torn row.
//!
//! [`EventEnvelope`]: hookrelay_types::EventEnvelope

mod error;
mod query;
mod store;

pub use error::{QueryError, StoreError};
pub use query::{QueryService, RecentEventsParams};
pub use store::{
    event_stats, get_event, insert_event, prune_oldest, query_events, EventFilter, PutOutcome,
    MAX_QUERY_LIMIT,
};
