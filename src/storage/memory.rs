//! In-memory event log.
//!
//! Lives as long as the process. Intended for tests and for embedding where
//! durability does not matter. Change notification is not provided: `listen`
//! returns `Error::Unsupported`.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{check_expected, EventLog};
use crate::types::{now_micros, EventId, ExpectedVersion, RawEvent, StoredEvent, StreamId, Version};
use crate::{Error, Result};

/// Streams kept as ordered vectors behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    streams: RwLock<HashMap<StreamId, Vec<StoredEvent>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams.
    pub fn len(&self) -> usize {
        self.streams.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of streams holding at least one event.
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }
}

fn last_version_of(events: &[StoredEvent]) -> Option<&Version> {
    events
        .last()
        .map(|e| &e.raw.version)
        .filter(|v| !v.is_empty())
}

impl EventLog for InMemoryEventLog {
    fn bootstrap(&self) -> Result<()> {
        Ok(())
    }

    fn append(
        &self,
        stream_id: &StreamId,
        raw: RawEvent,
        expected: &ExpectedVersion,
    ) -> Result<EventId> {
        let mut streams = self.streams.write();
        let events = streams.get(stream_id).map(Vec::as_slice).unwrap_or_default();

        check_expected(stream_id, expected, last_version_of(events))?;

        // Keep vector order and timestamp order identical even if the clock
        // steps backwards.
        let created_at = events
            .last()
            .map_or_else(now_micros, |last| now_micros().max(last.created_at));

        let event_id = EventId::generate();
        streams.entry(stream_id.clone()).or_default().push(StoredEvent {
            event_id: event_id.clone(),
            stream_id: stream_id.clone(),
            raw,
            created_at,
        });

        tracing::debug!(stream = %stream_id, event = %event_id, "appended (memory)");
        Ok(event_id)
    }

    fn get_by_event_id(&self, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent> {
        self.streams
            .read()
            .get(stream_id)
            .and_then(|events| events.iter().find(|e| &e.event_id == event_id))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                stream_id: stream_id.to_string(),
                event_id: event_id.to_string(),
            })
    }

    fn scan_stream(&self, stream_id: &StreamId) -> Result<Vec<StoredEvent>> {
        Ok(self
            .streams
            .read()
            .get(stream_id)
            .cloned()
            .unwrap_or_default())
    }

    fn last_version(&self, stream_id: &StreamId) -> Result<Option<Version>> {
        Ok(self
            .streams
            .read()
            .get(stream_id)
            .and_then(|events| last_version_of(events).cloned()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
