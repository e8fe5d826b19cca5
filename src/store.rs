//! # Event Store
//!
//! The entry point: owns the backend and the codec, hands out [`Stream`]s.
//!
//! ```text
//!   EventStore<E>
//!   ├── log: Arc<dyn EventLog>        SqliteEventLog | InMemoryEventLog
//!   ├── codec: VersionedCodec<E>      JSON by default
//!   ├── default stream  "default-stream"
//!   └── stream(name) ──► Stream<E> { Publisher<E>, Listener<E> }
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use streamstore::EventStore;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Person {
//!     #[serde(rename = "Name")]
//!     name: String,
//! }
//!
//! # async fn run() -> streamstore::Result<()> {
//! let store = EventStore::<Person>::open("events.db")?;
//! let people = store.stream("people");
//!
//! let sub = people.subscribe(|p: Person| println!("hello {}", p.name))?;
//! people.publish(&Person { name: "John".into() })?;
//! # sub.cancel();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{JsonCodec, TypedCodec, Versioned, VersionedCodec};
use crate::config::StoreConfig;
use crate::publisher::Publisher;
use crate::repository::TypedRepository;
use crate::storage::{EventLog, InMemoryEventLog, SqliteEventLog};
use crate::stream::Stream;
use crate::subscription::{Consumer, Subscription};
use crate::types::{EventId, ExpectedVersion, StreamId, Version, DEFAULT_STREAM};
use crate::Result;

/// Default stream, named-stream factory and codec configuration.
pub struct EventStore<E> {
    log: Arc<dyn EventLog>,
    codec: VersionedCodec<E>,
    default_stream: Stream<E>,
}

// =============================================================================
// Construction (JSON codec)
// =============================================================================

impl<E> EventStore<E>
where
    E: Serialize + DeserializeOwned + Send + 'static,
{
    /// Opens a SQLite-backed store at `path` with the JSON codec.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(StoreConfig::new(path))
    }

    /// Opens a SQLite-backed store described by `config`.
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        let log = SqliteEventLog::open_with_config(config)?;
        Ok(Self::from_log(Arc::new(log), JsonCodec::typed::<E>()))
    }

    /// Opens the store named by `STREAMSTORE_DATABASE`.
    pub fn from_env() -> Result<Self> {
        Self::open_with_config(StoreConfig::from_env()?)
    }

    /// A process-local store without change notification.
    pub fn in_memory() -> Self {
        Self::from_log(Arc::new(InMemoryEventLog::new()), JsonCodec::typed::<E>())
    }
}

// =============================================================================
// Configuration & Streams
// =============================================================================

impl<E: Send + 'static> EventStore<E> {
    /// Builds a store over any backend with the given codec.
    pub fn from_log(log: Arc<dyn EventLog>, codec: impl TypedCodec<E> + 'static) -> Self {
        Self::assemble(log, VersionedCodec::new(codec))
    }

    fn assemble(log: Arc<dyn EventLog>, codec: VersionedCodec<E>) -> Self {
        let default_stream = Stream::new(TypedRepository::new(
            Arc::clone(&log),
            DEFAULT_STREAM,
            codec.clone(),
        ));
        Self {
            log,
            codec,
            default_stream,
        }
    }

    /// Replaces the codec. Streams obtained earlier keep the old one.
    pub fn with_codec(self, codec: impl TypedCodec<E> + 'static) -> Self {
        Self::assemble(self.log, VersionedCodec::new(codec))
    }

    /// Stamps storage versions onto decoded events from now on.
    pub fn stamp_versions(self) -> Self
    where
        E: Versioned,
    {
        let codec = self.codec.stamping();
        Self::assemble(self.log, codec)
    }

    /// Creates the backend schema if missing. Idempotent.
    pub fn bootstrap(&self) -> Result<()> {
        self.log.bootstrap()
    }

    /// A handle to the stream called `name`, sharing this store's backend
    /// and codec.
    pub fn stream(&self, name: impl Into<StreamId>) -> Stream<E> {
        Stream::new(TypedRepository::new(
            Arc::clone(&self.log),
            name,
            self.codec.clone(),
        ))
    }

    pub fn default_stream(&self) -> &Stream<E> {
        &self.default_stream
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    // -------------------------------------------------------------------------
    // Default-stream shortcuts
    // -------------------------------------------------------------------------

    pub fn publish(&self, event: &E) -> Result<Version> {
        self.default_stream.publish(event)
    }

    pub fn with_type(&self, hint: impl Into<String>) -> Publisher<E> {
        self.default_stream.with_type(hint)
    }

    pub fn expected_version(&self, version: impl Into<ExpectedVersion>) -> Publisher<E> {
        self.default_stream.expected_version(version)
    }

    pub fn all(&self) -> Result<Vec<E>> {
        self.default_stream.all()
    }

    pub fn get_event(&self, event_id: &EventId) -> Result<E> {
        self.default_stream.get_event(event_id)
    }

    pub fn version(&self) -> Result<Option<Version>> {
        self.default_stream.version()
    }

    pub fn subscribe(&self, consumer: impl Consumer<E>) -> Result<Subscription> {
        self.default_stream.subscribe(consumer)
    }

    pub fn subscribe_from_beginning(&self, consumer: impl Consumer<E>) -> Result<Subscription> {
        self.default_stream.subscribe_from_beginning(consumer)
    }
}

impl<E> fmt::Debug for EventStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("backend", &self.log.backend())
            .field("codec", &self.codec)
            .finish()
    }
}
