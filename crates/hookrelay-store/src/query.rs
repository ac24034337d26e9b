//! Read-only query facade used by the agent-facing transport.
//!
//! [`QueryService`] owns a pool handle and no other state. It validates
//! caller-supplied filters (clamping `limit`, rejecting malformed
//! timestamps) before delegating to the store functions, so transport
//! handlers never build an [`EventFilter`] directly from untrusted input.

use chrono::{DateTime, Utc};
use hookrelay_db::DbPool;
use hookrelay_types::{EventEnvelope, StoreStatistics};

use crate::error::QueryError;
use crate::store::{self, EventFilter, MAX_QUERY_LIMIT};

/// Caller-supplied parameters for a recent-events query, before
/// validation. All fields optional; `since` is an RFC 3339 string as it
/// arrives from the transport.
#[derive(Debug, Clone, Default)]
pub struct RecentEventsParams {
    /// Exact event type to match.
    pub event_type: Option<String>,
    /// Exact repository full name to match.
    pub repository: Option<String>,
    /// RFC 3339 timestamp; inclusive lower bound.
    pub since: Option<String>,
    /// Requested maximum number of results.
    pub limit: Option<i64>,
}

/// Read-only query service over the event store.
///
/// Cheap to clone; safe to call from any number of concurrent contexts.
#[derive(Clone)]
pub struct QueryService {
    pool: DbPool,
}

impl QueryService {
    /// Creates a query service over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Returns envelopes matching `params`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidQuery`] if `since` is not RFC 3339 or
    /// `limit` is not positive; storage errors otherwise.
    pub fn recent_events(
        &self,
        params: &RecentEventsParams,
    ) -> Result<Vec<EventEnvelope>, QueryError> {
        let since = params
            .since
            .as_deref()
            .map(parse_since)
            .transpose()?;

        let limit = match params.limit {
            None => None,
            Some(n) if n >= 1 => Some((n.min(i64::from(MAX_QUERY_LIMIT))) as u32),
            Some(n) => {
                return Err(QueryError::InvalidQuery(format!(
                    "limit must be a positive integer, got {n}"
                )))
            }
        };

        let filter = EventFilter {
            event_type: params.event_type.clone(),
            repository_full_name: params.repository.clone(),
            since,
            limit,
        };

        let conn = self.pool.get()?;
        Ok(store::query_events(&conn, &filter)?)
    }

    /// Looks up a single envelope by delivery id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing envelope is `Ok(None)`.
    pub fn event_by_id(&self, delivery_id: &str) -> Result<Option<EventEnvelope>, QueryError> {
        let conn = self.pool.get()?;
        Ok(store::get_event(&conn, delivery_id)?)
    }

    /// Returns aggregate statistics over the store.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn stats(&self) -> Result<StoreStatistics, QueryError> {
        let conn = self.pool.get()?;
        Ok(store::event_stats(&conn)?)
    }
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QueryError::InvalidQuery(format!("since is not a valid RFC 3339 timestamp: {e}")))
}
