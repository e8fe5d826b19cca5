//! # streamstore - Event Log with Change Notification
//!
//! streamstore is an append-only, stream-partitioned event log on SQLite. It
//! provides:
//!
//! - **Streams**: named partitions, each replayed in insertion order
//! - **Optimistic concurrency**: appends guarded by the stream's last version
//! - **Pluggable codecs**: JSON, compact binary, passthrough; type-hinted
//!   decoding for sum-typed events; optional version stamping
//! - **Live subscriptions**: per-stream change signals delivered to a
//!   consumer callback, with catch-up replay and cancellation
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  EventStore<E> ── stream(name) ──► Stream<E>                    │
//! │                                    ├── Publisher<E>   (writes)  │
//! │                                    └── Listener<E>    (live)    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ TypedRepository<E>: codec ⇄ bytes
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  dyn EventLog                                                   │
//! │  ├── SqliteEventLog   writer + read pool + notify trigger/hub   │
//! │  └── InMemoryEventLog tests and embedding, no notification      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes flow down (Publisher → TypedRepository → EventLog → SQLite); change
//! signals flow up (trigger → hub → Listener → codec → consumer).
//!
//! ## Quick Start
//!
//! ```rust
//! use streamstore::{EventStore, NoopCodec};
//!
//! let store = EventStore::<String>::in_memory().with_codec(NoopCodec::typed());
//! let s1 = store.stream("s1");
//! s1.publish(&"my_event_data".to_string())?;
//! assert_eq!(s1.all()?, vec!["my_event_data"]);
//! # Ok::<(), streamstore::Error>(())
//! ```
//!
//! ## Guarantees
//!
//! 1. **Append-only**: no update or delete operation exists
//! 2. **Replay order**: `all()` returns a stream's events by insertion time
//! 3. **No partial writes**: a version mismatch writes nothing
//! 4. **Stream isolation**: subscribers of stream A never see stream B
//! 5. **At-least-once live delivery**: never exactly-once
//!
//! ## Module Organization
//!
//! - [`error`]: Error enum and `Result` alias
//! - [`types`]: Stream ids, event ids, version tokens, raw events
//! - [`config`]: Store configuration
//! - [`schema`]: SQLite DDL, bootstrap and notify trigger
//! - [`codec`]: Codec traits and implementations
//! - [`notify`]: Change-signal hub and feeds
//! - [`storage`]: `EventLog` trait and its backends
//! - [`repository`]: Typed access to one stream
//! - [`publisher`], [`subscription`], [`stream`], [`store`]: the public facade

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for streamstore operations.
pub mod error;

/// Domain types: `StreamId`, `EventId`, `Version`, `ExpectedVersion`, raw events.
pub mod types;

/// `StoreConfig` and its defaults.
pub mod config;

/// SQLite schema definitions, bootstrap and change-notification trigger.
pub mod schema;

/// Codecs: `Codec`, `TypedCodec`, `TypeHinted`, JSON/binary/noop, version stamping.
pub mod codec;

/// Per-stream change signals.
pub mod notify;

/// The `EventLog` contract, stream partitions and the SQLite / in-memory backends.
pub mod storage;

/// Codec-bound access to one stream.
pub mod repository;

/// Immutable, chainable write front end.
pub mod publisher;

/// Live subscriptions with catch-up and cancellation.
pub mod subscription;

/// Publisher + listener for one stream name.
pub mod stream;

/// The top-level store.
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use codec::{
    BinaryCodec, Codec, Decoder, JsonCodec, NoopCodec, TypeHinted, TypedCodec, Versioned,
    VersionedCodec,
};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use notify::ChangeFeed;
pub use publisher::Publisher;
pub use repository::TypedRepository;
pub use storage::{EventLog, InMemoryEventLog, Partition, SqliteEventLog};
pub use store::EventStore;
pub use stream::Stream;
pub use subscription::{Consumer, Listener, Subscription};
pub use types::{
    EventId, ExpectedVersion, RawEvent, StoredEvent, StreamId, Version, DEFAULT_STREAM,
};
