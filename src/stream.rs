//! A named stream: publisher and listener over the same partition.

use std::fmt;

use crate::codec::Versioned;
use crate::publisher::Publisher;
use crate::repository::TypedRepository;
use crate::subscription::{Consumer, Listener, Subscription};
use crate::types::{EventId, ExpectedVersion, StreamId, Version};
use crate::Result;

/// The unit application code holds for one partition of the log.
pub struct Stream<E> {
    repository: TypedRepository<E>,
    publisher: Publisher<E>,
    listener: Listener<E>,
}

impl<E: Send + 'static> Stream<E> {
    pub fn new(repository: TypedRepository<E>) -> Self {
        Self {
            publisher: Publisher::new(repository.clone()),
            listener: Listener::new(repository.clone()),
            repository,
        }
    }

    pub fn name(&self) -> &StreamId {
        self.repository.stream_id()
    }

    /// A publisher for this stream with the given type hint.
    pub fn with_type(&self, hint: impl Into<String>) -> Publisher<E> {
        self.publisher.with_type(hint)
    }

    /// A publisher for this stream guarded by `version`.
    pub fn expected_version(&self, version: impl Into<ExpectedVersion>) -> Publisher<E> {
        self.publisher.expected_version(version)
    }

    /// The unconfigured publisher for this stream.
    pub fn publisher(&self) -> Publisher<E> {
        self.publisher.clone()
    }

    pub fn listener(&self) -> Listener<E> {
        self.listener.clone()
    }

    pub fn publish(&self, event: &E) -> Result<Version> {
        self.publisher.publish(event)
    }

    pub fn subscribe(&self, consumer: impl Consumer<E>) -> Result<Subscription> {
        self.listener.subscribe(consumer)
    }

    pub fn subscribe_from_beginning(&self, consumer: impl Consumer<E>) -> Result<Subscription> {
        self.listener.subscribe_from_beginning(consumer)
    }

    pub fn all(&self) -> Result<Vec<E>> {
        self.repository.all()
    }

    pub fn get_event(&self, event_id: &EventId) -> Result<E> {
        self.repository.get_event(event_id)
    }

    /// Current version, to seed `expected_version`.
    pub fn version(&self) -> Result<Option<Version>> {
        self.repository.version()
    }

    pub fn repository(&self) -> &TypedRepository<E> {
        &self.repository
    }

    /// This stream with storage versions stamped onto decoded events.
    pub fn stamp_versions(&self) -> Self
    where
        E: Versioned,
    {
        Self::new(self.repository.stamp_versions())
    }
}

impl<E> Clone for Stream<E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            publisher: self.publisher.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<E> fmt::Debug for Stream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("name", self.repository.stream_id())
            .finish()
    }
}
