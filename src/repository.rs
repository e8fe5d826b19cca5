//! # Typed Repository
//!
//! Binds a codec to one stream of an [`EventLog`]: everything above this layer
//! deals in `E`, everything below in bytes.
//!
//! ```text
//!   insert_event(version, hint, &E) ──encode──► RawEvent ──► Partition::append
//!   get_event / all ◄──decode + stamp── RawEvent ◄── Partition::get / scan
//! ```

use std::fmt;
use std::sync::Arc;

use crate::codec::{TypedCodec, Versioned, VersionedCodec};
use crate::notify::ChangeFeed;
use crate::storage::{EventLog, Partition};
use crate::types::{EventId, ExpectedVersion, RawEvent, StoredEvent, StreamId, Version};
use crate::Result;

/// Typed access to one stream.
///
/// Cheap to clone. Every reconfiguration (`partition`, `with_codec`,
/// `stamp_versions`) returns a new handle and leaves `self` unchanged.
pub struct TypedRepository<E> {
    partition: Partition,
    codec: VersionedCodec<E>,
}

impl<E: 'static> TypedRepository<E> {
    pub fn new(log: Arc<dyn EventLog>, stream_id: impl Into<StreamId>, codec: VersionedCodec<E>) -> Self {
        Self {
            partition: Partition::new(log, stream_id),
            codec,
        }
    }

    /// The same stream decoded with another codec (no version stamping).
    pub fn with_codec(&self, codec: impl TypedCodec<E> + 'static) -> Self {
        self.with_versioned_codec(VersionedCodec::new(codec))
    }
}

impl<E> TypedRepository<E> {
    /// The same stream decoded with an already wrapped codec.
    pub fn with_versioned_codec(&self, codec: VersionedCodec<E>) -> Self {
        Self {
            partition: self.partition.clone(),
            codec,
        }
    }

    /// The same codec with storage versions stamped onto decoded events.
    pub fn stamp_versions(&self) -> Self
    where
        E: Versioned,
    {
        self.with_versioned_codec(self.codec.clone().stamping())
    }

    /// Another stream of the same log, with the same codec.
    pub fn partition(&self, stream_id: impl Into<StreamId>) -> Self {
        Self {
            partition: self.partition.partition(stream_id),
            codec: self.codec.clone(),
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        self.partition.stream_id()
    }

    pub fn codec(&self) -> &VersionedCodec<E> {
        &self.codec
    }

    /// Reads and decodes one event.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` for an unknown id
    /// - `Error::Decode` if the payload does not decode
    pub fn get_event(&self, event_id: &EventId) -> Result<E> {
        let stored = self.partition.get_by_event_id(event_id)?;
        self.decode(&stored)
    }

    /// Every event of the stream, decoded, in replay order.
    ///
    /// The first row that fails to decode aborts the call; no partial result
    /// is returned.
    pub fn all(&self) -> Result<Vec<E>> {
        self.partition
            .scan()?
            .iter()
            .map(|stored| self.decode(stored))
            .collect()
    }

    /// Every stored event of the stream, undecoded.
    pub fn all_raw(&self) -> Result<Vec<StoredEvent>> {
        self.partition.scan()
    }

    /// Encodes `event` and appends it with the given version and type hint.
    pub fn insert_event(
        &self,
        version: &Version,
        type_hint: &str,
        event: &E,
        expected: &ExpectedVersion,
    ) -> Result<EventId> {
        let raw = RawEvent {
            event_type: type_hint.to_string(),
            version: version.clone(),
            payload: self.codec.marshal(event)?,
        };
        self.partition.append(raw, expected)
    }

    /// The stream's current version, `None` when empty.
    pub fn version(&self) -> Result<Option<Version>> {
        self.partition.last_version()
    }

    /// Decodes a stored event with this repository's codec.
    pub fn decode(&self, stored: &StoredEvent) -> Result<E> {
        self.codec.decode(&stored.raw)
    }

    /// Registers for change signals on this stream.
    pub fn listen(&self) -> Result<ChangeFeed> {
        self.partition.listen()
    }
}

impl<E> Clone for TypedRepository<E> {
    fn clone(&self) -> Self {
        Self {
            partition: self.partition.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<E> fmt::Debug for TypedRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRepository")
            .field("partition", &self.partition)
            .field("codec", &self.codec)
            .finish()
    }
}
