//! # SQLite Event Log
//!
//! The durable backend. It owns three kinds of connections:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ SqliteEventLog                                                   │
//! │                                                                  │
//! │  writer: Mutex<Connection>   one per process, read-write,        │
//! │                              notify function + TEMP trigger      │
//! │  readers: ReadPool           N read-only, get/scan/last_version  │
//! │  subscription_slots          budget of dedicated read-only       │
//! │                              connections, one per ChangeFeed     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Append Protocol
//!
//! 1. `BEGIN IMMEDIATE` takes SQLite's write lock, so no other connection (in
//!    this process or another) can append between the check and the insert.
//! 2. For `ExpectedVersion::Exact(v)`, read the stream's last version and
//!    reject with `VersionMismatch` if it is not `v`. The transaction is
//!    dropped, so nothing is written.
//! 3. `INSERT` the row. The trigger queues a signal in `PendingSignals`.
//! 4. `COMMIT`, then flush queued signals to the [`NotificationHub`]. A failed
//!    transaction clears the queue instead, so listeners never hear about a
//!    row that does not exist.
//!
//! Signals reach every handle opened on the same file in this process, since
//! they share one [`NotificationHub`]. Appends from other processes are
//! visible to reads but raise no signal here.
//!
//! The writer mutex exists because a `rusqlite::Connection` is not `Sync`;
//! contention between appends is still resolved by the version check.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::pool::{open_read_only, ReadPool};
use super::{check_expected, EventLog};
use crate::config::StoreConfig;
use crate::notify::{ChangeFeed, EventFetcher, NotificationHub, PendingSignals};
use crate::schema;
use crate::types::{now_micros, EventId, ExpectedVersion, RawEvent, StoredEvent, StreamId, Version};
use crate::{Error, Result};

// =============================================================================
// SQL
// =============================================================================

const INSERT_EVENT: &str = r#"
INSERT INTO events (event_id, stream_id, event_type, version, payload, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const SELECT_EVENT: &str = r#"
SELECT event_id, stream_id, event_type, version, payload, created_at
FROM events
WHERE event_id = ?1 AND stream_id = ?2
"#;

const SELECT_STREAM: &str = r#"
SELECT event_id, stream_id, event_type, version, payload, created_at
FROM events
WHERE stream_id = ?1
ORDER BY created_at, rowid
"#;

const SELECT_LAST_CREATED_AT: &str = r#"
SELECT MAX(created_at)
FROM events
WHERE stream_id = ?1
"#;

const SELECT_LAST_VERSION: &str = r#"
SELECT version
FROM events
WHERE stream_id = ?1
ORDER BY created_at DESC, rowid DESC
LIMIT 1
"#;

// =============================================================================
// Row Access
// =============================================================================

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let event_type: Option<String> = row.get(2)?;
    let version: Option<String> = row.get(3)?;

    Ok(StoredEvent {
        event_id: EventId::new(row.get::<_, String>(0)?),
        stream_id: StreamId::new(row.get::<_, String>(1)?),
        raw: RawEvent {
            event_type: event_type.unwrap_or_default(),
            version: Version::new(version.unwrap_or_default()),
            payload: row.get(4)?,
        },
        created_at: row.get(5)?,
    })
}

/// Empty strings are stored as NULL.
fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn read_event(conn: &Connection, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent> {
    conn.query_row(
        SELECT_EVENT,
        params![event_id.as_str(), stream_id.as_str()],
        row_to_event,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound {
        stream_id: stream_id.to_string(),
        event_id: event_id.to_string(),
    })
}

fn read_stream(conn: &Connection, stream_id: &StreamId) -> Result<Vec<StoredEvent>> {
    let mut stmt = conn.prepare_cached(SELECT_STREAM)?;
    let events = stmt
        .query_map(params![stream_id.as_str()], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn read_last_version(conn: &Connection, stream_id: &StreamId) -> Result<Option<Version>> {
    let version: Option<Option<String>> = conn
        .query_row(SELECT_LAST_VERSION, params![stream_id.as_str()], |row| row.get(0))
        .optional()?;

    Ok(version
        .flatten()
        .filter(|v| !v.is_empty())
        .map(Version::new))
}

// =============================================================================
// Dedicated Subscription Connection
// =============================================================================

/// One read-only connection reserved for a single subscription.
///
/// Holds a permit of the subscription budget until dropped.
struct SubscriberConnection {
    conn: Mutex<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl EventFetcher for SubscriberConnection {
    fn fetch(&self, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent> {
        read_event(&self.conn.lock(), stream_id, event_id)
    }
}

// =============================================================================
// SqliteEventLog
// =============================================================================

/// Durable event log on a SQLite database file.
pub struct SqliteEventLog {
    config: StoreConfig,
    writer: Mutex<Connection>,
    readers: ReadPool,
    pending: PendingSignals,
    hub: Arc<NotificationHub>,
    subscription_slots: Arc<Semaphore>,
}

impl SqliteEventLog {
    /// Opens (creating if needed) the database at `path` with default settings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(StoreConfig::new(path))
    }

    /// Opens the database described by `config` and bootstraps its schema.
    ///
    /// # Errors
    ///
    /// - `Error::Config` for unusable budgets
    /// - `Error::Sqlite` if the file cannot be opened or created
    /// - `Error::Schema` if the file was created by an incompatible version
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let writer = Connection::open(&config.path)?;
        schema::configure_writer(&writer, config.busy_timeout)?;
        schema::bootstrap(&writer)?;

        let pending = PendingSignals::default();
        schema::install_notify_trigger(&writer, pending.clone())?;

        let readers = ReadPool::open(&config.path, config.read_pool_size, config.busy_timeout)?;

        tracing::info!(
            path = %config.path.display(),
            readers = config.read_pool_size,
            max_subscriptions = config.max_subscriptions,
            "opened sqlite event log"
        );

        Ok(Self {
            hub: NotificationHub::shared(&config.path, config.notify_capacity),
            subscription_slots: Arc::new(Semaphore::new(config.max_subscriptions)),
            writer: Mutex::new(writer),
            readers,
            pending,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Subscriptions that can still be opened.
    pub fn available_subscriptions(&self) -> usize {
        self.subscription_slots.available_permits()
    }

    /// Streams that currently have at least one registered listener.
    pub fn active_channels(&self) -> usize {
        self.hub.channel_count()
    }

    fn insert(
        conn: &mut Connection,
        stream_id: &StreamId,
        event_id: &EventId,
        raw: &RawEvent,
        expected: &ExpectedVersion,
    ) -> Result<()> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !expected.is_any() {
            let last = read_last_version(&tx, stream_id)?;
            check_expected(stream_id, expected, last.as_ref())?;
        }

        // Never stamp a row earlier than the stream's newest one, so replay
        // order and the last version follow append order when the clock
        // steps back or another writer's clock runs ahead.
        let newest: Option<i64> =
            tx.query_row(SELECT_LAST_CREATED_AT, params![stream_id.as_str()], |row| row.get(0))?;
        let created_at = newest.map_or_else(now_micros, |t| now_micros().max(t));

        tx.execute(
            INSERT_EVENT,
            params![
                event_id.as_str(),
                stream_id.as_str(),
                non_empty(&raw.event_type),
                non_empty(raw.version.as_str()),
                raw.payload,
                created_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl EventLog for SqliteEventLog {
    fn bootstrap(&self) -> Result<()> {
        let writer = self.writer.lock();
        schema::bootstrap(&writer)?;
        schema::install_notify_trigger(&writer, self.pending.clone())
    }

    fn append(
        &self,
        stream_id: &StreamId,
        raw: RawEvent,
        expected: &ExpectedVersion,
    ) -> Result<EventId> {
        let event_id = EventId::generate();
        let mut writer = self.writer.lock();

        match Self::insert(&mut writer, stream_id, &event_id, &raw, expected) {
            Ok(()) => {
                // Flushed under the writer lock so signals leave in commit order.
                self.hub.notify_all(self.pending.take());
                tracing::debug!(stream = %stream_id, event = %event_id, "appended");
                Ok(event_id)
            }
            Err(e) => {
                self.pending.clear();
                if e.is_version_mismatch() {
                    tracing::debug!(stream = %stream_id, "append rejected: version mismatch");
                }
                Err(e)
            }
        }
    }

    fn get_by_event_id(&self, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent> {
        self.readers
            .with_connection(|conn| read_event(conn, stream_id, event_id))
    }

    fn scan_stream(&self, stream_id: &StreamId) -> Result<Vec<StoredEvent>> {
        self.readers.with_connection(|conn| read_stream(conn, stream_id))
    }

    fn last_version(&self, stream_id: &StreamId) -> Result<Option<Version>> {
        self.readers
            .with_connection(|conn| read_last_version(conn, stream_id))
    }

    fn listen(&self, stream_id: &StreamId) -> Result<ChangeFeed> {
        let permit = Arc::clone(&self.subscription_slots)
            .try_acquire_owned()
            .map_err(|_| Error::SubscriptionLimit {
                max: self.config.max_subscriptions,
            })?;

        let conn = open_read_only(&self.config.path, self.config.busy_timeout)?;
        let fetcher = Arc::new(SubscriberConnection {
            conn: Mutex::new(conn),
            _permit: permit,
        });

        let receiver = self.hub.listen(stream_id.as_str());
        Ok(ChangeFeed::new(stream_id.clone(), receiver, fetcher))
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

impl std::fmt::Debug for SqliteEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventLog")
            .field("path", &self.config.path)
            .field("readers", &self.readers.size())
            .field("available_subscriptions", &self.available_subscriptions())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
