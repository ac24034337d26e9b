//! Database layer for hookrelay.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, and embedded SQL migrations. The event store's
//! durability contract lives here: connections run with
//! `synchronous = FULL`, so once an insert commits it has reached stable
//! storage and a crash immediately after an acknowledged write cannot
//! lose the row.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: single-process store, no external database.
//!   WAL allows concurrent readers alongside the single writer, matching
//!   the ingest-many/query-many access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files compiled into the binary via
//!   `include_str!`, so schema and code cannot drift apart.

mod migrations;
mod pool;

pub use migrations::run_migrations;
pub use pool::{create_pool, DbPool, DbRuntimeSettings};
