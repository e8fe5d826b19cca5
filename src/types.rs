//! # Domain Types for streamstore
//!
//! This module defines the vocabulary of the event log: which stream an event
//! belongs to, how it is identified, the version token used for optimistic
//! concurrency, and the raw (undecoded) shape events take in storage.
//!
//! ## Rust Pattern: Newtypes
//!
//! Stream ids, event ids and version tokens are all strings on disk, but they
//! are never interchangeable. Wrapping each in its own type means
//! `get_by_event_id(&stream, &event)` cannot be called with the arguments
//! swapped.
//!
//! ```rust
//! use streamstore::{StreamId, Version};
//!
//! let stream = StreamId::new("orders");
//! let version = Version::generate();
//! assert_ne!(stream.as_str(), version.as_str());
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the stream an [`crate::EventStore`] publishes to when no name is given.
pub const DEFAULT_STREAM: &str = "default-stream";

// =============================================================================
// Stream Identity
// =============================================================================

/// Identifies a stream (partition) of the event log.
///
/// A stream is not stored anywhere by itself: it exists only as the
/// `stream_id` column of its events. Appending to a new name creates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a new stream ID from a string.
    ///
    /// # Rust Pattern: impl Into<String>
    ///
    /// Callers can pass `&str` or `String`; the conversion happens here.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this stream ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Event Identity
// =============================================================================

/// Opaque unique identifier assigned to an event when it is appended.
///
/// Generated as a random UUID, so it is unique within its stream and, in
/// practice, globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventId(String);

impl EventId {
    /// Wraps an existing id, e.g. one read back from storage or a signal.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Version Tokens
// =============================================================================

/// Opaque version token carried by an event.
///
/// # Not a Position
///
/// Versions are random, not sequential. They say nothing about where an event
/// sits in its stream; they only serve as a witness for optimistic
/// concurrency: "I read the stream when its last event had this version".
///
/// An empty version means "none" (events may be appended without one).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The "no version" token.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The concurrency condition attached to an append.
///
/// # Semantics
///
/// - `Any`: the write is unconditional.
/// - `Exact(v)`: the write succeeds only if `v` is the version of the stream's
///   last event. An empty stream has no last version, so `Exact` always fails
///   against it.
///
/// Converting from an empty string or an empty [`Version`] yields `Any`, so
/// callers that keep the expected version as a plain string can pass `""` to
/// mean "no check".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    #[default]
    Any,
    Exact(Version),
}

impl ExpectedVersion {
    pub fn is_any(&self) -> bool {
        matches!(self, ExpectedVersion::Any)
    }
}

impl From<Version> for ExpectedVersion {
    fn from(version: Version) -> Self {
        if version.is_empty() {
            ExpectedVersion::Any
        } else {
            ExpectedVersion::Exact(version)
        }
    }
}

impl From<&Version> for ExpectedVersion {
    fn from(version: &Version) -> Self {
        version.clone().into()
    }
}

impl From<Option<Version>> for ExpectedVersion {
    fn from(version: Option<Version>) -> Self {
        version.map(Into::into).unwrap_or_default()
    }
}

impl From<&str> for ExpectedVersion {
    fn from(s: &str) -> Self {
        Version::new(s).into()
    }
}

impl From<String> for ExpectedVersion {
    fn from(s: String) -> Self {
        Version::from(s).into()
    }
}

// =============================================================================
// Raw Events
// =============================================================================

/// An event before type-specific decoding: (type hint, version, payload).
///
/// This is what callers hand to [`crate::EventLog::append`]. The log assigns
/// the event id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEvent {
    /// Decoder selector for polymorphic codecs. Empty means "default decoder".
    pub event_type: String,
    /// Version token stored with the event. Empty means none.
    pub version: Version,
    /// Codec-defined serialized body.
    pub payload: Vec<u8>,
}

impl RawEvent {
    /// Creates an untyped, unversioned raw event.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type: String::new(),
            version: Version::none(),
            payload: payload.into(),
        }
    }

    /// Sets the type hint.
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Sets the version token.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }
}

/// An event as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub stream_id: StreamId,
    pub raw: RawEvent,
    /// Insertion time in microseconds since the Unix epoch.
    pub created_at: i64,
}

// =============================================================================
// Time
// =============================================================================

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// A clock set before 1970 yields 0 rather than failing; replay order then
/// falls back to insertion order.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
