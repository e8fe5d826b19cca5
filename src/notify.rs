//! # Change Notification
//!
//! Turns committed inserts into per-stream signals that subscriptions wait on.
//!
//! ## Architecture
//!
//! ```text
//!   writer connection                      NotificationHub
//!   ┌────────────────────┐   commit   ┌───────────────────────────────┐
//!   │ trigger → Pending  │──────────► │ "orders"  → broadcast::Sender │──► ChangeFeed (sub 1)
//!   │          Signals   │   flush    │ "billing" → broadcast::Sender │──► ChangeFeed (sub 2)
//!   └────────────────────┘            └───────────────────────────────┘
//! ```
//!
//! A signal carries only the event id. The subscriber fetches the full row
//! through its own dedicated connection (an [`EventFetcher`]), so a signal
//! never has to fit a payload and readers never contend with the writer's
//! connection.
//!
//! ## Sharing
//!
//! Every [`SqliteEventLog`](crate::SqliteEventLog) opened on the same database
//! file in one process uses the same hub ([`NotificationHub::shared`]), so a
//! subscription made through one handle sees appends made through any other.
//! Writers in other processes do not reach this hub.
//!
//! ## Rust Pattern: tokio::sync::broadcast
//!
//! Every stream name gets its own bounded broadcast channel, so subscribers of
//! stream A never see signals for stream B. A receiver that falls more than
//! `capacity` signals behind gets `RecvError::Lagged`, which [`ChangeFeed`]
//! reports as [`Error::SubscriptionLagged`] instead of silently skipping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::types::{EventId, StoredEvent, StreamId};
use crate::{Error, Result};

// =============================================================================
// Signals
// =============================================================================

/// A change signal: `payload` was inserted into `channel`.
///
/// For the event log the channel is the stream id and the payload the event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub channel: String,
    pub payload: String,
}

/// Signals raised inside a transaction that has not committed yet.
///
/// # Rust Pattern: std Mutex inside a SQL function
///
/// rusqlite requires application functions to be `UnwindSafe`. `Arc<std::sync::Mutex<_>>`
/// is; a poisoned lock is recovered rather than propagated because the
/// queue holds plain data with no invariant a panic could break.
#[derive(Debug, Clone, Default)]
pub struct PendingSignals(Arc<Mutex<Vec<Signal>>>);

impl PendingSignals {
    pub fn push(&self, signal: Signal) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }

    /// Removes and returns every queued signal.
    pub fn take(&self) -> Vec<Signal> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drops queued signals (their transaction rolled back).
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// =============================================================================
// Notification Hub
// =============================================================================

/// Live hubs by canonical database path.
static SHARED_HUBS: OnceLock<parking_lot::Mutex<HashMap<PathBuf, Weak<NotificationHub>>>> =
    OnceLock::new();

/// Fan-out of committed signals to listeners, one channel per name.
///
/// Channels are created by the first listener and removed once a signal
/// finds no receivers left.
#[derive(Debug)]
pub struct NotificationHub {
    channels: RwLock<HashMap<String, broadcast::Sender<EventId>>>,
    capacity: usize,
}

impl NotificationHub {
    /// Creates a hub whose channels buffer `capacity` signals each.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// The hub shared by every handle on the database at `path`.
    ///
    /// The hub lives while any handle holds it. `capacity` applies only when
    /// no hub exists yet for `path`.
    pub fn shared(path: &Path, capacity: usize) -> Arc<Self> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut hubs = SHARED_HUBS.get_or_init(Default::default).lock();
        hubs.retain(|_, hub| hub.strong_count() > 0);

        if let Some(hub) = hubs.get(&key).and_then(Weak::upgrade) {
            return hub;
        }
        let hub = Arc::new(Self::new(capacity));
        hubs.insert(key, Arc::downgrade(&hub));
        hub
    }

    /// Registers interest in `channel`.
    ///
    /// Signals published after this call returns are visible to the receiver.
    pub fn listen(&self, channel: &str) -> broadcast::Receiver<EventId> {
        let mut channels = self.channels.write();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Delivers one signal to the listeners of its channel.
    pub fn notify(&self, signal: Signal) {
        let delivered = {
            let channels = self.channels.read();
            match channels.get(&signal.channel) {
                Some(sender) => sender.send(EventId::new(signal.payload)).is_ok(),
                None => return,
            }
        };

        if !delivered {
            let mut channels = self.channels.write();
            if let Some(sender) = channels.get(&signal.channel) {
                if sender.receiver_count() == 0 {
                    channels.remove(&signal.channel);
                }
            }
        }
    }

    /// Delivers signals in order.
    pub fn notify_all(&self, signals: impl IntoIterator<Item = Signal>) {
        for signal in signals {
            self.notify(signal);
        }
    }

    /// Number of channels with a live sender.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

// =============================================================================
// Change Feed
// =============================================================================

/// Reads a full event by id for a subscription.
///
/// Implemented by each backend's dedicated subscription connection.
pub trait EventFetcher: Send + Sync {
    fn fetch(&self, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent>;
}

/// A registered interest in one stream: the signal receiver plus the resource
/// used to fetch signalled events.
///
/// Dropping the feed unregisters it and releases the fetcher (and with it the
/// dedicated connection once no fetch is in flight).
pub struct ChangeFeed {
    stream_id: StreamId,
    receiver: broadcast::Receiver<EventId>,
    fetcher: Arc<dyn EventFetcher>,
}

impl ChangeFeed {
    pub fn new(
        stream_id: StreamId,
        receiver: broadcast::Receiver<EventId>,
        fetcher: Arc<dyn EventFetcher>,
    ) -> Self {
        Self {
            stream_id,
            receiver,
            fetcher,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Shared handle to the fetcher, for use on a blocking thread.
    pub fn fetcher(&self) -> Arc<dyn EventFetcher> {
        Arc::clone(&self.fetcher)
    }

    /// Waits for the next signalled event id.
    ///
    /// Returns `Ok(None)` once the hub is gone (the store was dropped).
    pub async fn next(&mut self) -> Result<Option<EventId>> {
        match self.receiver.recv().await {
            Ok(event_id) => Ok(Some(event_id)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(Error::SubscriptionLagged {
                stream_id: self.stream_id.to_string(),
                skipped,
            }),
        }
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(channel: &str, payload: &str) -> Signal {
        Signal {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    struct NoFetch;

    impl EventFetcher for NoFetch {
        fn fetch(&self, stream_id: &StreamId, event_id: &EventId) -> Result<StoredEvent> {
            Err(Error::NotFound {
                stream_id: stream_id.to_string(),
                event_id: event_id.to_string(),
            })
        }
    }

    #[test]
    fn test_pending_take_and_clear() {
        let pending = PendingSignals::default();
        pending.push(signal("a", "1"));
        pending.push(signal("a", "2"));

        assert_eq!(pending.take(), vec![signal("a", "1"), signal("a", "2")]);
        assert!(pending.take().is_empty());

        pending.push(signal("a", "3"));
        pending.clear();
        assert!(pending.take().is_empty());
    }

    #[tokio::test]
    async fn test_hub_routes_by_channel() {
        let hub = NotificationHub::new(16);
        let mut orders = hub.listen("orders");
        let mut billing = hub.listen("billing");

        hub.notify_all(vec![signal("orders", "o1"), signal("billing", "b1"), signal("orders", "o2")]);

        assert_eq!(orders.recv().await.unwrap(), EventId::new("o1"));
        assert_eq!(orders.recv().await.unwrap(), EventId::new("o2"));
        assert_eq!(billing.recv().await.unwrap(), EventId::new("b1"));
        assert!(orders.try_recv().is_err());
    }

    #[test]
    fn test_hub_without_listener_drops_signal() {
        let hub = NotificationHub::new(16);
        hub.notify(signal("nobody", "x"));
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn test_hub_prunes_abandoned_channel() {
        let hub = NotificationHub::new(16);
        let receiver = hub.listen("orders");
        assert_eq!(hub.channel_count(), 1);

        drop(receiver);
        hub.notify(signal("orders", "o1"));
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn test_shared_hub_per_database_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.db");
        std::fs::write(&path, b"").unwrap();

        let first = NotificationHub::shared(&path, 8);
        let same = NotificationHub::shared(&dir.path().join(".").join("events.db"), 8);
        let other = NotificationHub::shared(&dir.path().join("other.db"), 8);

        assert!(Arc::ptr_eq(&first, &same));
        assert!(!Arc::ptr_eq(&first, &other));

        let _receiver = same.listen("orders");
        assert_eq!(first.channel_count(), 1);

        drop((first, same));
        let fresh = NotificationHub::shared(&path, 8);
        assert_eq!(fresh.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_feed_reports_lag() {
        let hub = NotificationHub::new(2);
        let mut feed = ChangeFeed::new(
            StreamId::new("orders"),
            hub.listen("orders"),
            Arc::new(NoFetch),
        );

        for i in 0..5 {
            hub.notify(signal("orders", &i.to_string()));
        }

        let err = feed.next().await.unwrap_err();
        assert!(matches!(err, Error::SubscriptionLagged { skipped: 3, .. }));
    }

    #[tokio::test]
    async fn test_feed_ends_when_hub_dropped() {
        let hub = NotificationHub::new(4);
        let mut feed = ChangeFeed::new(
            StreamId::new("orders"),
            hub.listen("orders"),
            Arc::new(NoFetch),
        );
        drop(hub);

        assert!(feed.next().await.unwrap().is_none());
    }
}
