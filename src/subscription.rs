//! # Listeners & Subscriptions
//!
//! Turns change signals into decoded events handed to a consumer callback.
//!
//! ## Delivery Loop
//!
//! Each subscription runs one tokio task:
//!
//! ```text
//!   ┌───────────────────────────── task ─────────────────────────────┐
//!   │ loop {                                                         │
//!   │   select! { cancelled => stop,                                 │
//!   │             feed.next() => event_id }                          │
//!   │   spawn_blocking { fetch row by id (dedicated conn); decode }  │
//!   │   gate { if cancelled: stop; consumer.consume(event) }         │
//!   │ }                                                              │
//!   └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events of one subscription are delivered one at a time, in signal order
//! (commit order for appends made through the same store).
//!
//! ## Catch-Up + Live
//!
//! [`Listener::subscribe_from_beginning`] registers on the channel *before*
//! scanning history:
//!
//! ```text
//!   listen() ──► scan + deliver history ──► live loop
//!      │                                       │
//!      └── signals buffered meanwhile ─────────┘ (ids already replayed are skipped)
//! ```
//!
//! An event committed during the replay is therefore neither missed (its signal
//! is buffered) nor delivered twice (its id is in the replayed set). Because
//! signals arrive in commit order, the replayed set is dropped at the first
//! signal it does not contain. Consumers should still treat delivery as
//! at-least-once: the store makes no exactly-once promise.
//!
//! ## Failure Policy
//!
//! A fetch or decode failure, or a lagged channel, stops that subscription.
//! The error is logged with `tracing::error!` and returned by
//! [`Subscription::closed`]. Other subscriptions keep running.
//!
//! ## Cancellation
//!
//! [`Subscription::cancel`] and the delivery step share a gate (a reentrant
//! mutex held only around the synchronous consume call). Once `cancel`
//! returns, no further callback starts. A consumer may cancel its own
//! subscription from inside the callback.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::VersionedCodec;
use crate::notify::ChangeFeed;
use crate::repository::TypedRepository;
use crate::types::{EventId, StreamId};
use crate::{Error, Result};

// =============================================================================
// Consumer
// =============================================================================

/// Receives decoded events.
///
/// Implemented for every `Fn(E) + Send + Sync + 'static`, so closures work
/// directly:
///
/// ```rust,ignore
/// let sub = listener.subscribe(|event: Order| println!("{event:?}"))?;
/// ```
pub trait Consumer<E>: Send + Sync + 'static {
    fn consume(&self, event: E);
}

impl<E, F> Consumer<E> for F
where
    F: Fn(E) + Send + Sync + 'static,
{
    fn consume(&self, event: E) {
        self(event)
    }
}

// =============================================================================
// Listener
// =============================================================================

/// The read side of a stream: starts subscriptions.
pub struct Listener<E> {
    repository: TypedRepository<E>,
}

impl<E: Send + 'static> Listener<E> {
    pub fn new(repository: TypedRepository<E>) -> Self {
        Self { repository }
    }

    pub fn stream_id(&self) -> &StreamId {
        self.repository.stream_id()
    }

    /// Delivers every event appended from now on to `consumer`.
    ///
    /// Must be called within a tokio runtime. Returns as soon as the
    /// subscription is registered; delivery happens on a background task.
    ///
    /// # Errors
    ///
    /// - `Error::NoRuntime` outside a tokio runtime
    /// - `Error::Unsupported` if the backend has no change notification
    /// - `Error::SubscriptionLimit` if the connection budget is exhausted
    pub fn subscribe(&self, consumer: impl Consumer<E>) -> Result<Subscription> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let feed = self.repository.listen()?;
        Ok(self.spawn(&runtime, feed, Arc::new(consumer), HashSet::new()))
    }

    /// Replays every existing event to `consumer`, then continues live.
    ///
    /// Blocks while the history is read and delivered. If any historical event
    /// fails to decode, nothing is delivered and the error is returned.
    pub fn subscribe_from_beginning(&self, consumer: impl Consumer<E>) -> Result<Subscription> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let feed = self.repository.listen()?;

        let history = self.repository.all_raw()?;
        let events = history
            .iter()
            .map(|stored| self.repository.decode(stored))
            .collect::<Result<Vec<_>>>()?;

        let consumer = Arc::new(consumer);
        let mut replayed = HashSet::with_capacity(history.len());
        for (stored, event) in history.into_iter().zip(events) {
            consumer.consume(event);
            replayed.insert(stored.event_id);
        }

        tracing::debug!(
            stream = %self.stream_id(),
            replayed = replayed.len(),
            "catch-up replay delivered"
        );
        Ok(self.spawn(&runtime, feed, consumer, replayed))
    }

    fn spawn<C: Consumer<E>>(
        &self,
        runtime: &Handle,
        feed: ChangeFeed,
        consumer: Arc<C>,
        replayed: HashSet<EventId>,
    ) -> Subscription {
        let token = CancellationToken::new();
        let gate = Arc::new(ReentrantMutex::new(()));
        let stream_id = feed.stream_id().clone();

        let delivery = Delivery {
            feed,
            codec: self.repository.codec().clone(),
            consumer,
            replayed,
            token: token.clone(),
            gate: Arc::clone(&gate),
        };
        let handle = runtime.spawn(delivery.run());

        tracing::info!(stream = %stream_id, "subscription started");
        Subscription {
            stream_id,
            token,
            gate,
            handle: Some(handle),
        }
    }
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("stream_id", self.repository.stream_id())
            .finish()
    }
}

// =============================================================================
// Delivery Task
// =============================================================================

struct Delivery<E, C> {
    feed: ChangeFeed,
    codec: VersionedCodec<E>,
    consumer: Arc<C>,
    replayed: HashSet<EventId>,
    token: CancellationToken,
    gate: Arc<ReentrantMutex<()>>,
}

impl<E, C> Delivery<E, C>
where
    E: Send + 'static,
    C: Consumer<E>,
{
    async fn run(mut self) -> Result<()> {
        let stream_id = self.feed.stream_id().clone();
        let result = self.deliver().await;

        match &result {
            Ok(()) => tracing::info!(stream = %stream_id, "subscription stopped"),
            Err(e) => tracing::error!(stream = %stream_id, error = %e, "subscription failed"),
        }
        result
    }

    async fn deliver(&mut self) -> Result<()> {
        loop {
            let event_id = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(()),
                next = self.feed.next() => match next {
                    Ok(Some(event_id)) => event_id,
                    Ok(None) => return Ok(()),
                    Err(e) => {
                        if let Error::SubscriptionLagged { skipped, .. } = &e {
                            tracing::warn!(stream = %self.feed.stream_id(), skipped, "subscriber lagged");
                        }
                        return Err(e);
                    }
                },
            };

            if self.already_replayed(&event_id) {
                continue;
            }

            let event = self.fetch(event_id.clone()).await?;

            let _gate = self.gate.lock();
            if self.token.is_cancelled() {
                return Ok(());
            }
            self.consumer.consume(event);
            tracing::debug!(stream = %self.feed.stream_id(), event = %event_id, "delivered");
        }
    }

    fn already_replayed(&mut self, event_id: &EventId) -> bool {
        if self.replayed.is_empty() {
            return false;
        }
        if self.replayed.remove(event_id) {
            return true;
        }
        self.replayed.clear();
        false
    }

    /// Fetches and decodes on the blocking pool.
    fn fetch(&self, event_id: EventId) -> impl Future<Output = Result<E>> + Send + 'static {
        let fetcher = self.feed.fetcher();
        let codec = self.codec.clone();
        let stream_id = self.feed.stream_id().clone();

        async move {
            tokio::task::spawn_blocking(move || {
                let stored = fetcher.fetch(&stream_id, &event_id)?;
                codec.decode(&stored.raw)
            })
            .await
            .map_err(|e| Error::Task(e.to_string()))?
        }
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle to a running subscription.
///
/// Dropping the handle cancels the subscription.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    stream_id: StreamId,
    token: CancellationToken,
    gate: Arc<ReentrantMutex<()>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl Subscription {
    /// Stops delivery. Idempotent.
    ///
    /// When this returns, no further consumer call will start. A call already
    /// running on another thread finishes first.
    pub fn cancel(&self) {
        let _gate = self.gate.lock();
        if !self.token.is_cancelled() {
            self.token.cancel();
            tracing::debug!(stream = %self.stream_id, "subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the delivery task has ended (cancelled or failed).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Waits for the delivery task to end and reports why it ended.
    ///
    /// `Ok(())` after cancellation or store shutdown; the failure otherwise.
    pub async fn closed(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|e| Error::Task(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("stream_id", &self.stream_id)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
