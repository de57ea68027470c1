//! Persistent event log backed by SQLite.
//!
//! The store owns an `r2d2` pool; every operation checks a connection out and
//! returns it when the guard drops, on success and error paths alike. The
//! pool is built lazily, so a missing or unopenable database does not prevent
//! construction: operations degrade to empty, `false` or `0` results and
//! `insert` reports [`StoreError::Unavailable`].

pub mod query;
pub mod schema;

use std::path::{Path, PathBuf};
use chrono::DateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OpenFlags, OptionalExtension, Row};

use crate::config::StoreConfig;
use crate::core::{Event, EventKind};
use crate::error::StoreError;

pub use query::{DateRange, EventTypeFilter, ExtensionChoice, QueryFilters, ALL_SENTINEL};

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

const IN_MEMORY: &str = ":memory:";

/// Handle to the event log. Clones share the same pool.
#[derive(Clone)]
pub struct EventStore {
    pool: DbPool,
    path: PathBuf,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore").field("path", &self.path).finish()
    }
}

impl EventStore {
    /// Opens the store described by `config`. Never fails; see module docs.
    pub fn open(config: &StoreConfig) -> Self {
        let path = config.db_path.clone();
        let in_memory = path.as_os_str() == IN_MEMORY;
        let busy_timeout_ms = config.busy_timeout_ms;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let manager = if in_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&path)
        }
        .with_flags(flags)
        .with_init(move |conn| schema::initialize(conn, busy_timeout_ms));

        // An in-memory database lives and dies with its single connection.
        let builder = if in_memory {
            Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            Pool::builder().max_size(config.pool_max_size).min_idle(Some(0))
        };

        let pool = builder
            .connection_timeout(config.connect_timeout())
            .build_unchecked(manager);

        tracing::info!(db = %path.display(), "event store opened");

        Self { pool, path }
    }

    /// Opens a store at `path` with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> Self {
        let config = StoreConfig {
            db_path: path.as_ref().to_path_buf(),
            ..StoreConfig::default()
        };
        Self::open(&config)
    }

    /// Opens a private in-memory store.
    pub fn in_memory() -> Self {
        Self::open_path(IN_MEMORY)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool.get().map_err(StoreError::Unavailable)
    }

    /// Whether a connection can currently be acquired.
    pub fn is_available(&self) -> bool {
        match self.conn() {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!("event store unavailable: {}", err);
                false
            }
        }
    }

    /// Appends `event` and returns its newly assigned id.
    ///
    /// Any id already carried by `event` is ignored.
    pub fn insert(&self, event: &Event) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        insert_row(&conn, event)?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, kind = %event.event_type(), path = %event.file_path().display(), "event stored");
        Ok(id)
    }

    /// Appends all `events` in one transaction. Either every row is written or none.
    pub fn insert_batch(&self, events: &[Event]) -> Result<Vec<i64>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            insert_row(&tx, event)?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit()?;

        tracing::info!(count = ids.len(), "event batch stored");
        Ok(ids)
    }

    /// Removes the row with `id`. Returns whether a row was removed.
    pub fn delete_by_id(&self, id: i64) -> bool {
        let result = self
            .conn()
            .and_then(|conn| Ok(conn.execute("DELETE FROM events WHERE id = ?1", [id])?));

        match result {
            Ok(removed) => {
                tracing::debug!(id, removed, "delete by id");
                removed > 0
            }
            Err(err) => {
                tracing::warn!(id, "delete failed: {}", err);
                false
            }
        }
    }

    /// Drops and recreates the event table, discarding every row.
    ///
    /// Runs in a single transaction: on failure existing data is left intact.
    /// Confirmation is the caller's responsibility.
    pub fn reset(&self) -> bool {
        let result = self.conn().and_then(|mut conn| {
            let tx = conn.transaction()?;
            schema::recreate_events_table(&tx)?;
            tx.commit()?;
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::info!(db = %self.path.display(), "event store reset");
                true
            }
            Err(err) => {
                tracing::warn!("reset failed: {}", err);
                false
            }
        }
    }

    /// Every stored event in insertion order.
    pub fn fetch_all(&self) -> Vec<Event> {
        let sql = format!("SELECT {} FROM events ORDER BY id ASC", schema::EVENT_COLUMNS);
        self.select_events(&sql, &[]).unwrap_or_else(|err| {
            tracing::warn!("fetch_all failed: {}", err);
            Vec::new()
        })
    }

    pub fn count_all(&self) -> u64 {
        let result = self.conn().and_then(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get::<_, i64>(0))?)
        });

        match result {
            Ok(count) => count.max(0) as u64,
            Err(err) => {
                tracing::warn!("count failed: {}", err);
                0
            }
        }
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Event>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM events WHERE id = ?1", schema::EVENT_COLUMNS);
        Ok(conn.query_row(&sql, [id], event_from_row).optional()?)
    }

    /// `(event type, count)` pairs ordered by event type.
    pub fn count_by_event_type(&self) -> Vec<(String, u64)> {
        self.grouped_counts("event")
    }

    /// `(extension, count)` pairs ordered by extension; `""` is files without one.
    pub fn count_by_extension(&self) -> Vec<(String, u64)> {
        self.grouped_counts("file_extension")
    }

    fn grouped_counts(&self, column: &'static str) -> Vec<(String, u64)> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM events GROUP BY {column} ORDER BY {column} ASC"
        );

        let result = self.conn().and_then(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });

        result.unwrap_or_else(|err| {
            tracing::warn!(column, "grouped count failed: {}", err);
            Vec::new()
        })
    }

    pub(crate) fn select_events(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let events = stmt
            .query_map(params, event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

fn insert_row(conn: &rusqlite::Connection, event: &Event) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO events (filename, file_path, file_extension, event, event_timestamp, file_size, is_directory, username)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.filename(),
            event.file_path().to_string_lossy(),
            event.extension(),
            event.event_type().as_str(),
            event.timestamp().timestamp(),
            event.file_size().map(|size| size as i64),
            event.is_directory(),
            event.user(),
        ],
    )
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get(4)?;
    let event_type = EventKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown event type '{kind}'").into(),
        )
    })?;

    let secs: i64 = row.get(5)?;
    let timestamp = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {secs}").into(),
        )
    })?;

    Ok(Event::from_row(
        row.get(0)?,
        row.get(1)?,
        PathBuf::from(row.get::<_, String>(2)?),
        row.get(3)?,
        event_type,
        timestamp,
        row.get::<_, Option<i64>>(6)?.map(|size| size.max(0) as u64),
        row.get(7)?,
        row.get(8)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn event(path: &str, kind: EventKind, secs: i64) -> Event {
        Event::new(path, kind, Utc.timestamp_opt(secs, 0).unwrap())
            .with_size(Some(10))
            .with_user("tester")
    }

    fn temp_store() -> (TempDir, EventStore) {
        let dir = TempDir::new().unwrap();
        let store = EventStore::open_path(dir.path().join("events.db"));
        (dir, store)
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (_dir, store) = temp_store();

        let first = store.insert(&event("/w/a.txt", EventKind::Created, 100)).unwrap();
        let second = store.insert(&event("/w/b.txt", EventKind::Modified, 101)).unwrap();

        assert!(second > first);
        assert_eq!(store.count_all(), 2);
    }

    #[test]
    fn inserted_event_round_trips() {
        let (_dir, store) = temp_store();
        let original = event("/w/notes.MD", EventKind::Modified, 1_700_000_000).with_directory(false);

        let id = store.insert(&original).unwrap();
        let stored = store.get_by_id(id).unwrap().expect("row should exist");

        assert_eq!(stored, original.with_id(id));
    }

    #[test]
    fn deleted_event_keeps_null_size() {
        let (_dir, store) = temp_store();
        let deleted = Event::new("/w/old.log", EventKind::Deleted, Utc::now());

        let id = store.insert(&deleted).unwrap();
        let stored = store.get_by_id(id).unwrap().unwrap();

        assert_eq!(stored.file_size(), None);
        assert_eq!(stored.event_type(), EventKind::Deleted);
    }

    #[test]
    fn delete_by_id_removes_one_row() {
        let (_dir, store) = temp_store();
        let keep = store.insert(&event("/w/keep.txt", EventKind::Created, 1)).unwrap();
        let drop = store.insert(&event("/w/drop.txt", EventKind::Created, 2)).unwrap();

        assert!(store.delete_by_id(drop));
        assert!(!store.delete_by_id(drop), "second delete is a no-op");
        assert!(!store.delete_by_id(9_999));

        let remaining: Vec<i64> = store.fetch_all().iter().filter_map(Event::id).collect();
        assert_eq!(remaining, vec![keep]);
    }

    #[test]
    fn reset_empties_table_and_never_reuses_ids() {
        let (_dir, store) = temp_store();
        let mut last = 0;
        for n in 0..3 {
            last = store.insert(&event("/w/a.txt", EventKind::Created, n)).unwrap();
        }

        assert!(store.reset());
        assert_eq!(store.count_all(), 0);
        assert!(store.fetch_all().is_empty());

        let next = store.insert(&event("/w/b.txt", EventKind::Created, 10)).unwrap();
        assert!(next > last, "id {next} should be above pre-reset id {last}");
    }

    #[test]
    fn reset_on_empty_store_succeeds() {
        let (_dir, store) = temp_store();
        assert!(store.reset());
        assert_eq!(store.count_all(), 0);
        assert_eq!(store.insert(&event("/w/a.txt", EventKind::Created, 1)).unwrap(), 1);
    }

    #[test]
    fn insert_batch_is_all_or_nothing() {
        let (_dir, store) = temp_store();

        assert!(store.insert_batch(&[]).unwrap().is_empty());

        let ids = store
            .insert_batch(&[
                event("/w/a.txt", EventKind::Created, 1),
                event("/w/b.txt", EventKind::Modified, 2),
            ])
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert!(ids[1] > ids[0]);
        assert_eq!(store.count_all(), 2);
    }

    #[test]
    fn grouped_counts() {
        let (_dir, store) = temp_store();
        store.insert(&event("/w/a.txt", EventKind::Created, 1)).unwrap();
        store.insert(&event("/w/b.txt", EventKind::Modified, 2)).unwrap();
        store.insert(&event("/w/c.png", EventKind::Created, 3)).unwrap();
        store.insert(&event("/w/Makefile", EventKind::Deleted, 4)).unwrap();

        assert_eq!(
            store.count_by_event_type(),
            vec![
                ("created".to_string(), 2),
                ("deleted".to_string(), 1),
                ("modified".to_string(), 1),
            ]
        );
        assert_eq!(
            store.count_by_extension(),
            vec![
                ("".to_string(), 1),
                (".png".to_string(), 1),
                (".txt".to_string(), 2),
            ]
        );
    }

    #[test]
    fn in_memory_store_keeps_rows_across_operations() {
        let store = EventStore::in_memory();
        store.insert(&event("/w/a.txt", EventKind::Created, 1)).unwrap();
        store.insert(&event("/w/b.txt", EventKind::Created, 2)).unwrap();

        assert_eq!(store.count_all(), 2);
        assert_eq!(store.fetch_all().len(), 2);
    }

    #[test]
    fn unavailable_store_degrades() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("missing").join("nested").join("events.db"),
            connect_timeout_ms: 100,
            ..StoreConfig::default()
        };
        let store = EventStore::open(&config);

        assert!(!store.is_available());
        assert!(matches!(
            store.insert(&event("/w/a.txt", EventKind::Created, 1)),
            Err(StoreError::Unavailable(_))
        ));
        assert!(!store.delete_by_id(1));
        assert!(!store.reset());
        assert!(store.fetch_all().is_empty());
        assert_eq!(store.count_all(), 0);
        assert!(store.count_by_extension().is_empty());
    }

    #[test]
    fn schema_setup_failure_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("events.db");
        std::fs::write(&db_path, vec![0xAB; 4096]).unwrap();

        let config = StoreConfig {
            db_path,
            connect_timeout_ms: 100,
            ..StoreConfig::default()
        };
        let store = EventStore::open(&config);

        assert!(matches!(
            store.insert(&event("/w/a.txt", EventKind::Created, 1)),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(store.get_by_id(1), Err(StoreError::Unavailable(_))));
        assert!(store.query(&QueryFilters::default()).is_empty());
    }
}
