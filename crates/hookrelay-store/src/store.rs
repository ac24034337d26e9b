//! Persistence operations for the event store.
//!
//! All writes go through [`insert_event`], which serialises the payload
//! and inserts into the `events` table in a single statement guarded by
//! the `delivery_id` UNIQUE constraint.
//!
//! Reads go through [`get_event`], [`query_events`] (filtering by event
//! type, repository, and time range, newest first), and [`event_stats`].

use chrono::{DateTime, SecondsFormat, Utc};
use hookrelay_types::{
    EventEnvelope, OrganizationRef, RepositoryRef, SenderRef, StoreStatistics,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;

/// Hard cap on the number of envelopes a single query may return,
/// regardless of the requested limit.
pub const MAX_QUERY_LIMIT: u32 = 100;

/// Result of a `put`: either the envelope was newly inserted, or an
/// envelope with the same `delivery_id` already existed and the call was
/// a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The envelope was inserted.
    Inserted,
    /// An envelope with this `delivery_id` already exists. The stored
    /// record is untouched; redeliveries never overwrite.
    Duplicate,
}

/// Timestamps are stored as RFC 3339 UTC with fixed microsecond
/// precision so that lexicographic order equals chronological order.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Writes a single envelope to the store.
///
/// Idempotent on `delivery_id`: if a row with the same key already
/// exists, nothing is written and [`PutOutcome::Duplicate`] is returned.
/// The insert commits before this function returns (the connection runs
/// with `synchronous = FULL`), so a returned [`PutOutcome::Inserted`]
/// means the envelope is on stable storage.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure or
/// `StoreError::Serialization` if the payload cannot be serialised.
pub fn insert_event(conn: &Connection, envelope: &EventEnvelope) -> Result<PutOutcome, StoreError> {
    let payload_json = serde_json::to_string(&envelope.payload)?;
    let repo = envelope.repository.as_ref();
    let sender = envelope.sender.as_ref();
    let org = envelope.organization.as_ref();

    let changed = conn.execute(
        "INSERT INTO events
            (delivery_id, event_type, action,
             repo_id, repo_name, repo_full_name, repo_url,
             sender_login, sender_id, org_login, org_id,
             received_at, payload_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT (delivery_id) DO NOTHING",
        params![
            envelope.delivery_id,
            envelope.event_type,
            envelope.action,
            repo.and_then(|r| r.id),
            repo.and_then(|r| r.name.as_deref()),
            repo.and_then(|r| r.full_name.as_deref()),
            repo.and_then(|r| r.url.as_deref()),
            sender.and_then(|s| s.login.as_deref()),
            sender.and_then(|s| s.id),
            org.and_then(|o| o.login.as_deref()),
            org.and_then(|o| o.id),
            encode_timestamp(&envelope.received_at),
            payload_json,
        ],
    )?;

    if changed == 0 {
        tracing::debug!(
            delivery_id = %envelope.delivery_id,
            "duplicate delivery, store unchanged"
        );
        Ok(PutOutcome::Duplicate)
    } else {
        Ok(PutOutcome::Inserted)
    }
}

/// Looks up a single envelope by its `delivery_id`.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn get_event(conn: &Connection, delivery_id: &str) -> Result<Option<EventEnvelope>, StoreError> {
    conn.query_row(
        "SELECT delivery_id, event_type, action,
                repo_id, repo_name, repo_full_name, repo_url,
                sender_login, sender_id, org_login, org_id,
                received_at, payload_json
         FROM events WHERE delivery_id = ?1",
        params![delivery_id],
        envelope_from_row,
    )
    .optional()?
    .transpose()
}

/// Filter criteria for querying the event store.
///
/// Each field is independently optional; an empty filter matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Exact match on the envelope's event type.
    pub event_type: Option<String>,
    /// Exact match on `repository.full_name`.
    pub repository_full_name: Option<String>,
    /// Inclusive lower bound on the ingestion timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of envelopes to return. Capped at
    /// [`MAX_QUERY_LIMIT`] regardless of the requested value.
    pub limit: Option<u32>,
}

/// Queries the store with optional filters.
///
/// Results are ordered newest first by ingestion timestamp, ties broken
/// by insertion order (most recently inserted first). The limit
/// truncates after ordering, so it never biases which matching rows are
/// considered.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn query_events(
    conn: &Connection,
    filter: &EventFilter,
) -> Result<Vec<EventEnvelope>, StoreError> {
    // Build a parameterised query dynamically. WHERE clauses and bind
    // parameters are collected separately so nothing is interpolated.
    let mut clauses = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref et) = filter.event_type {
        clauses.push(format!("event_type = ?{idx}"));
        param_values.push(Box::new(et.clone()));
        idx += 1;
    }

    if let Some(ref repo) = filter.repository_full_name {
        clauses.push(format!("repo_full_name = ?{idx}"));
        param_values.push(Box::new(repo.clone()));
        idx += 1;
    }

    if let Some(ref since) = filter.since {
        clauses.push(format!("received_at >= ?{idx}"));
        param_values.push(Box::new(encode_timestamp(since)));
        idx += 1;
    }

    let limit = filter.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT);
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT delivery_id, event_type, action,
                repo_id, repo_name, repo_full_name, repo_url,
                sender_login, sender_id, org_login, org_id,
                received_at, payload_json
         FROM events
         {where_clause}
         ORDER BY received_at DESC, id DESC
         LIMIT ?{idx}"
    );

    param_values.push(Box::new(limit));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), envelope_from_row)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row??);
    }

    Ok(events)
}

/// Computes aggregate statistics over the store.
///
/// Aggregates are recomputed from the table inside a single read
/// transaction, so the result always equals a scan of the store at the
/// instant of the call. There is no cached counter to go stale.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn event_stats(conn: &Connection) -> Result<StoreStatistics, StoreError> {
    let tx = conn.unchecked_transaction()?;

    let (total, earliest, latest): (i64, Option<String>, Option<String>) = tx.query_row(
        "SELECT COUNT(*), MIN(received_at), MAX(received_at) FROM events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut events_by_type = std::collections::BTreeMap::new();
    {
        let mut stmt =
            tx.prepare("SELECT event_type, COUNT(*) FROM events GROUP BY event_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (event_type, count) = row?;
            events_by_type.insert(event_type, count.max(0) as u64);
        }
    }

    let mut repositories = Vec::new();
    {
        let mut stmt = tx.prepare(
            "SELECT DISTINCT repo_full_name FROM events
             WHERE repo_full_name IS NOT NULL
             ORDER BY repo_full_name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            repositories.push(row?);
        }
    }

    tx.commit()?;

    Ok(StoreStatistics {
        total_events: total.max(0) as u64,
        earliest: earliest.as_deref().map(decode_timestamp).transpose()?,
        latest: latest.as_deref().map(decode_timestamp).transpose()?,
        unique_repositories: repositories.len() as u64,
        events_by_type,
        repositories,
    })
}

/// Deletes the oldest rows beyond `max_events`, oldest by insertion
/// order. Returns the number of rows deleted.
///
/// Used by the optional retention task; the store is append-only unless
/// a cap is configured.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn prune_oldest(conn: &Connection, max_events: u64) -> Result<usize, StoreError> {
    let keep = i64::try_from(max_events).unwrap_or(i64::MAX);
    let deleted = conn.execute(
        "DELETE FROM events
         WHERE id NOT IN (SELECT id FROM events ORDER BY id DESC LIMIT ?1)",
        params![keep],
    )?;
    Ok(deleted)
}

/// Maps one `events` row back into an [`EventEnvelope`].
///
/// Returns a nested `Result` so payload/timestamp decode failures
/// surface as [`StoreError`] rather than being shoehorned into
/// `rusqlite::Error`.
fn envelope_from_row(row: &Row<'_>) -> rusqlite::Result<Result<EventEnvelope, StoreError>> {
    let delivery_id: String = row.get(0)?;
    let event_type: String = row.get(1)?;
    let action: String = row.get(2)?;
    let repo_id: Option<i64> = row.get(3)?;
    let repo_name: Option<String> = row.get(4)?;
    let repo_full_name: Option<String> = row.get(5)?;
    let repo_url: Option<String> = row.get(6)?;
    let sender_login: Option<String> = row.get(7)?;
    let sender_id: Option<i64> = row.get(8)?;
    let org_login: Option<String> = row.get(9)?;
    let org_id: Option<i64> = row.get(10)?;
    let received_at: String = row.get(11)?;
    let payload_json: String = row.get(12)?;

    let repository = if repo_id.is_some()
        || repo_name.is_some()
        || repo_full_name.is_some()
        || repo_url.is_some()
    {
        Some(RepositoryRef {
            id: repo_id,
            name: repo_name,
            full_name: repo_full_name,
            url: repo_url,
        })
    } else {
        None
    };

    let sender = if sender_login.is_some() || sender_id.is_some() {
        Some(SenderRef {
            login: sender_login,
            id: sender_id,
        })
    } else {
        None
    };

    let organization = if org_login.is_some() || org_id.is_some() {
        Some(OrganizationRef {
            login: org_login,
            id: org_id,
        })
    } else {
        None
    };

    let build = || -> Result<EventEnvelope, StoreError> {
        Ok(EventEnvelope {
            event_type,
            delivery_id,
            received_at: decode_timestamp(&received_at)?,
            action,
            repository,
            sender,
            organization,
            payload: serde_json::from_str(&payload_json)?,
        })
    };
    Ok(build())
}
