//! # SQLite Schema for streamstore
//!
//! This module defines the on-disk layout of the event log and the
//! change-notification trigger.
//!
//! ## Table Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  events                                  streamstore_metadata    │
//! │  ┌────────────────────────────┐          ┌──────────────────┐    │
//! │  │ event_id    TEXT           │          │ key   TEXT (PK)  │    │
//! │  │ stream_id   TEXT           │          │ value TEXT       │    │
//! │  │ event_type  TEXT NULL      │          └──────────────────┘    │
//! │  │ version     TEXT NULL      │                                  │
//! │  │ payload     BLOB           │                                  │
//! │  │ created_at  INTEGER (µs)   │                                  │
//! │  └────────────────────────────┘                                  │
//! │   indexes: events_stream        (stream_id)                      │
//! │            events_stream_version (stream_id, version)            │
//! │            events_event_stream  UNIQUE (event_id, stream_id)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Change Notification
//!
//! SQLite has no LISTEN/NOTIFY. The writer connection registers an application
//! function, `streamstore_notify(channel, payload)`, and a `TEMP` trigger that
//! calls it after every insert with `(NEW.stream_id, NEW.event_id)`:
//!
//! ```text
//!   INSERT INTO events ...           (inside the append transaction)
//!        │
//!        ▼
//!   TRIGGER events_notify ──► streamstore_notify() ──► PendingSignals queue
//!                                                          │
//!   COMMIT ────────────────────────────────────────────────┘
//!        │                                      flush only after commit
//!        ▼
//!   NotificationHub ──► broadcast channel "<stream_id>" ──► subscribers
//! ```
//!
//! The trigger is `TEMP` because the function exists only on the writer
//! connection; a persistent trigger would make inserts from any other
//! connection fail with "no such function".

use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::notify::{PendingSignals, Signal};
use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
///
/// There are no migrations: opening a database with a different version is
/// an error.
const SCHEMA_VERSION: i32 = 1;

/// Name of the application-defined SQL function called by the trigger.
pub const NOTIFY_FUNCTION: &str = "streamstore_notify";

// =============================================================================
// DDL Statements
// =============================================================================

/// The `events` table. Append-only: nothing in the crate updates or deletes rows.
///
/// # Columns
///
/// - `event_id`: random UUID assigned at append time
/// - `stream_id`: partition key
/// - `event_type`: type hint for polymorphic decoding, NULL when empty
/// - `version`: opaque concurrency token, NULL when empty
/// - `payload`: codec-defined body
/// - `created_at`: microseconds since the Unix epoch
///
/// Replay order is `created_at`, then `rowid` for events stamped in the same
/// microsecond. The implicit rowid is never reused because rows are never
/// deleted.
const CREATE_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id   TEXT    NOT NULL,
    stream_id  TEXT    NOT NULL,
    event_type TEXT,
    version    TEXT,
    payload    BLOB    NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

/// Scans by stream.
const CREATE_STREAM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS events_stream
ON events(stream_id, created_at)
"#;

/// Version lookups within a stream.
const CREATE_STREAM_VERSION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS events_stream_version
ON events(stream_id, version)
"#;

/// Enforces `(event_id, stream_id)` uniqueness and serves point reads.
const CREATE_EVENT_STREAM_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS events_event_stream
ON events(event_id, stream_id)
"#;

/// Key/value metadata, currently only `schema_version`.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS streamstore_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// Fires once per inserted row, inside the inserting transaction.
const CREATE_NOTIFY_TRIGGER: &str = r#"
CREATE TEMP TRIGGER IF NOT EXISTS events_notify
AFTER INSERT ON events
FOR EACH ROW
BEGIN
    SELECT streamstore_notify(NEW.stream_id, NEW.event_id);
END
"#;

// =============================================================================
// Connection Setup
// =============================================================================

/// Applies the pragmas every read-write connection uses.
///
/// - WAL: readers see a consistent snapshot while the writer appends.
/// - synchronous = NORMAL: sync the WAL on commit, not on every page write.
pub fn configure_writer(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode = WAL")?;
    conn.execute_batch("PRAGMA synchronous = NORMAL")?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    Ok(())
}

/// Applies the pragmas read-only connections use.
pub fn configure_reader(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

// =============================================================================
// Bootstrap
// =============================================================================

/// Creates the table, indexes and metadata if missing, then checks the schema
/// version. Safe to call any number of times.
///
/// Runs in one `IMMEDIATE` transaction, so connections bootstrapping a new
/// file at the same time wait for each other (up to the busy timeout) instead
/// of racing on the version row.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    tx.execute_batch(CREATE_METADATA)?;
    tx.execute_batch(CREATE_EVENTS)?;
    tx.execute_batch(CREATE_STREAM_INDEX)?;
    tx.execute_batch(CREATE_STREAM_VERSION_INDEX)?;
    tx.execute_batch(CREATE_EVENT_STREAM_INDEX)?;
    verify_or_set_version(&tx)?;

    tx.commit()?;
    Ok(())
}

/// Registers the notify function on `conn` and installs the trigger.
///
/// Every row inserted through `conn` afterwards pushes one [`Signal`] onto
/// `pending`. The caller decides when to deliver them (after commit) or drop
/// them (after rollback).
pub fn install_notify_trigger(conn: &Connection, pending: PendingSignals) -> Result<()> {
    conn.create_scalar_function(
        NOTIFY_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8,
        move |ctx| {
            let channel: String = ctx.get(0)?;
            let payload: String = ctx.get(1)?;
            pending.push(Signal { channel, payload });
            Ok(true)
        },
    )?;
    conn.execute_batch(CREATE_NOTIFY_TRIGGER)?;
    Ok(())
}

/// Verifies the schema version, or sets it if this is a new database.
fn verify_or_set_version(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM streamstore_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO streamstore_metadata (key, value) VALUES ('schema_version', ?1)",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(Error::Schema(format!(
                "schema version mismatch: database has version {v}, but this build requires {SCHEMA_VERSION}"
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        bootstrap(&conn).expect("bootstrap");
        conn
    }

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%'")
            .expect("should prepare");
        stmt.query_map([kind], |row| row.get(0))
            .expect("should query")
            .collect::<std::result::Result<Vec<_>, _>>()
            .expect("should collect")
    }

    #[test]
    fn test_tables_created() {
        let conn = fresh();
        let mut tables = names(&conn, "table");
        tables.sort();
        assert_eq!(tables, vec!["events", "streamstore_metadata"]);
    }

    #[test]
    fn test_indexes_created() {
        let conn = fresh();
        let indexes = names(&conn, "index");

        for expected in ["events_stream", "events_stream_version", "events_event_stream"] {
            assert!(
                indexes.contains(&expected.to_string()),
                "should have {expected} index"
            );
        }
    }

    #[test]
    fn test_schema_version_stored() {
        let conn = fresh();
        let version: String = conn
            .query_row(
                "SELECT value FROM streamstore_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .expect("should query version");

        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_double_bootstrap() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("test.db");

        {
            let conn = Connection::open(&path).expect("first open");
            configure_writer(&conn, Duration::from_secs(1)).expect("configure");
            bootstrap(&conn).expect("first bootstrap");
        }

        let conn = Connection::open(&path).expect("second open");
        bootstrap(&conn).expect("second bootstrap");
        bootstrap(&conn).expect("third bootstrap");
        assert_eq!(names(&conn, "table").len(), 2);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let conn = fresh();
        conn.execute(
            "UPDATE streamstore_metadata SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .expect("update");

        let err = bootstrap(&conn).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_unique_event_stream_pair() {
        let conn = fresh();
        let insert = "INSERT INTO events (event_id, stream_id, payload, created_at) VALUES (?1, ?2, x'00', 1)";

        conn.execute(insert, ["e1", "a"]).expect("first insert");
        conn.execute(insert, ["e1", "b"]).expect("same id, other stream");
        assert!(conn.execute(insert, ["e1", "a"]).is_err());
    }

    #[test]
    fn test_trigger_queues_signal_per_insert() {
        let conn = fresh();
        let pending = PendingSignals::default();
        install_notify_trigger(&conn, pending.clone()).expect("install");
        install_notify_trigger(&conn, pending.clone()).expect("reinstall is idempotent");

        conn.execute(
            "INSERT INTO events (event_id, stream_id, payload, created_at) VALUES ('e1', 'orders', x'00', 1)",
            [],
        )
        .expect("insert");

        let signals = pending.take();
        assert_eq!(
            signals,
            vec![Signal {
                channel: "orders".into(),
                payload: "e1".into()
            }]
        );
        assert!(pending.take().is_empty());
    }

    #[test]
    fn test_concurrent_bootstrap_of_new_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("events.db");
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                let barrier = std::sync::Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let conn = Connection::open(&path)?;
                    conn.busy_timeout(Duration::from_secs(5))?;
                    barrier.wait();
                    bootstrap(&conn)
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread").expect("bootstrap");
        }

        let conn = Connection::open(&path).expect("open");
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM streamstore_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(rows, 1);
    }
}
