//! # Event Log Storage
//!
//! The storage layer knows streams, ids, versions and payload bytes. It never
//! decodes a payload; that happens one layer up in
//! [`crate::repository::TypedRepository`].
//!
//! ## Backends
//!
//! | Backend | Durable | Change notification |
//! |---------|---------|---------------------|
//! | [`SqliteEventLog`] | yes | yes (trigger + hub) |
//! | [`InMemoryEventLog`] | no | no (`Error::Unsupported`) |
//!
//! Both implement [`EventLog`] and apply the same concurrency rule.
//!
//! ## Optimistic Concurrency
//!
//! ```text
//!   append(stream, raw, expected)
//!        │
//!        ├─ expected = Any ───────────────────────────► insert
//!        │
//!        └─ expected = Exact(v)
//!               │
//!               ├─ last version of stream == v ───────► insert
//!               └─ otherwise (incl. empty stream) ────► VersionMismatch, nothing written
//! ```
//!
//! The comparison is against the stream's *last* event, so a version that is
//! still present but stale is rejected too. Check and insert are atomic with
//! respect to every other append.

use std::fmt;
use std::sync::Arc;

use crate::notify::ChangeFeed;
use crate::types::{EventId, ExpectedVersion, RawEvent, StoredEvent, StreamId, Version};
use crate::{Error, Result};

pub mod memory;
pub mod pool;
pub mod sqlite;

pub use memory::InMemoryEventLog;
pub use sqlite::SqliteEventLog;

// =============================================================================
// EventLog Trait
// =============================================================================

/// Physical storage of events, independent of event typing.
///
/// # Rust Pattern: Object-Safe Trait
///
/// Every method takes `&self` and concrete argument types, so the store can
/// hold an `Arc<dyn EventLog>` and pick the backend at runtime.
pub trait EventLog: Send + Sync {
    /// Creates the backing schema if missing. Idempotent.
    fn bootstrap(&self) -> Result<()>;

    /// Appends one event, returning its generated id.
    ///
    /// # Errors
    ///
    /// - `Error::VersionMismatch` if `expected` is `Exact(v)` and `v` is not
    ///   the stream's last version. Nothing is written.
    fn append(&self, stream_id: &StreamId, raw: RawEvent, expected: &ExpectedVersion)
        -> Result<EventId>;

    /// Point read of one event.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if no event has this id in this stream.
    fn get_by_event_id(&self, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent>;

    /// Every event of the stream, in replay order (insertion time, then
    /// insertion order).
    fn scan_stream(&self, stream_id: &StreamId) -> Result<Vec<StoredEvent>>;

    /// Version of the stream's last event; `None` for an empty stream or an
    /// event appended without a version.
    fn last_version(&self, stream_id: &StreamId) -> Result<Option<Version>>;

    /// Registers for change signals on `stream_id`.
    ///
    /// Events committed after this returns are signalled on the feed.
    fn listen(&self, stream_id: &StreamId) -> Result<ChangeFeed> {
        let _ = stream_id;
        Err(Error::Unsupported("change notification"))
    }

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

// =============================================================================
// Partition
// =============================================================================

/// An [`EventLog`] handle scoped to one stream.
///
/// # Value Semantics
///
/// [`Partition::partition`] returns a new handle for another stream while
/// `self` keeps pointing at its own. Both share the same backend.
#[derive(Clone)]
pub struct Partition {
    log: Arc<dyn EventLog>,
    stream_id: StreamId,
}

impl Partition {
    pub fn new(log: Arc<dyn EventLog>, stream_id: impl Into<StreamId>) -> Self {
        Self {
            log,
            stream_id: stream_id.into(),
        }
    }

    /// A handle to another stream of the same log.
    pub fn partition(&self, stream_id: impl Into<StreamId>) -> Self {
        Self {
            log: Arc::clone(&self.log),
            stream_id: stream_id.into(),
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn append(&self, raw: RawEvent, expected: &ExpectedVersion) -> Result<EventId> {
        self.log.append(&self.stream_id, raw, expected)
    }

    pub fn get_by_event_id(&self, event_id: &EventId) -> Result<StoredEvent> {
        self.log.get_by_event_id(&self.stream_id, event_id)
    }

    pub fn scan(&self) -> Result<Vec<StoredEvent>> {
        self.log.scan_stream(&self.stream_id)
    }

    pub fn last_version(&self) -> Result<Option<Version>> {
        self.log.last_version(&self.stream_id)
    }

    pub fn listen(&self) -> Result<ChangeFeed> {
        self.log.listen(&self.stream_id)
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("backend", &self.log.backend())
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Applies the concurrency rule given the stream's current last version.
pub(crate) fn check_expected(
    stream_id: &StreamId,
    expected: &ExpectedVersion,
    last: Option<&Version>,
) -> Result<()> {
    match expected {
        ExpectedVersion::Any => Ok(()),
        ExpectedVersion::Exact(want) if last == Some(want) => Ok(()),
        ExpectedVersion::Exact(want) => Err(Error::VersionMismatch {
            stream_id: stream_id.to_string(),
            expected: want.to_string(),
        }),
    }
}
