//! Event table schema.
//!
//! The schema is applied on every new pooled connection, so a database that
//! appears after startup is initialized on first use.

use rusqlite::{Connection, OptionalExtension, Transaction};

/// Name of the single event table.
pub const EVENTS_TABLE: &str = "events";

/// Table and index definitions. Idempotent.
pub const EVENTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_extension TEXT NOT NULL DEFAULT '',
    event TEXT NOT NULL,
    event_timestamp INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
    file_size INTEGER,
    is_directory INTEGER NOT NULL DEFAULT 0,
    username TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events (event_timestamp DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_events_extension ON events (file_extension);
CREATE INDEX IF NOT EXISTS idx_events_event ON events (event);
";

/// Column list shared by every `SELECT` that rebuilds an [`crate::core::Event`].
pub const EVENT_COLUMNS: &str =
    "id, filename, file_path, file_extension, event, event_timestamp, file_size, is_directory, username";

/// Connection setup: pragmas plus the event table.
pub fn initialize(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    // In-memory databases report "memory" instead of "wal".
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        tracing::warn!(journal_mode = %journal_mode, "WAL journal mode not available");
    }

    conn.execute_batch(&format!("PRAGMA busy_timeout = {};", busy_timeout_ms))?;
    conn.execute_batch(EVENTS_DDL)
}

/// Highest id ever issued for the event table, including deleted rows.
pub fn id_high_water(conn: &Connection) -> rusqlite::Result<i64> {
    let sequence: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [EVENTS_TABLE],
            |row| row.get(0),
        )
        .optional()?;
    let max_id: Option<i64> = conn.query_row("SELECT MAX(id) FROM events", [], |row| row.get(0))?;

    Ok(sequence.unwrap_or(0).max(max_id.unwrap_or(0)))
}

/// Drops and recreates the event table inside `tx`.
///
/// The AUTOINCREMENT sequence is reseeded to the previous high-water mark so
/// ids issued after the reset never repeat earlier ones.
pub fn recreate_events_table(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let high_water = id_high_water(tx)?;

    tx.execute_batch("DROP TABLE IF EXISTS events;")?;
    tx.execute_batch(EVENTS_DDL)?;

    if high_water > 0 {
        tx.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            rusqlite::params![EVENTS_TABLE, high_water],
        )?;
    }

    Ok(())
}

pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )
}
