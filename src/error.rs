//! # Error Handling for streamstore
//!
//! Every fallible operation in the crate returns [`Result`], whose error type is
//! the single [`Error`] enum defined here.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` conversions come from `#[from]` (so `?` works on rusqlite calls)
//!
//! ## Error Categories
//!
//! | Category | Variants | Typical Response |
//! |----------|----------|------------------|
//! | Contention | `VersionMismatch` | Re-read the stream version and retry |
//! | Lookup | `NotFound` | Surface to the caller |
//! | Codec | `Encode`, `Decode` | Fix the event type or codec registration |
//! | Capability | `Unsupported`, `NoRuntime` | Use a backend/runtime that supports it |
//! | Subscription | `SubscriptionLimit`, `SubscriptionLagged`, `Task` | Cancel idle subscriptions, resubscribe |
//! | Internal | `Sqlite`, `Schema`, `Config` | Log and investigate |

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in streamstore operations.
///
/// # Example
///
/// ```rust,ignore
/// use streamstore::{Error, ExpectedVersion};
///
/// match publisher.expected_version(last).publish(&event) {
///     Ok(version) => last = version,
///     Err(Error::VersionMismatch { .. }) => { /* reload and retry */ }
///     Err(other) => return Err(other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Contention
    // =========================================================================

    /// Optimistic concurrency check failed: the stream's last version is not
    /// the one the caller expected. Nothing was written.
    ///
    /// # Recovery
    ///
    /// 1. Read the current version of the stream
    /// 2. Re-apply business logic against the fresh state
    /// 3. Publish again with the new expected version
    #[error("version mismatch on stream '{stream_id}': expected version '{expected}' is not current")]
    VersionMismatch {
        /// The stream where the check failed
        stream_id: String,
        /// The version token the caller expected to be current
        expected: String,
    },

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Point lookup found no event with this id in this stream.
    #[error("event '{event_id}' not found in stream '{stream_id}'")]
    NotFound {
        /// The stream that was searched
        stream_id: String,
        /// The event id that was requested
        event_id: String,
    },

    // =========================================================================
    // Codec
    // =========================================================================

    /// An event could not be serialized into a payload.
    #[error("encode error: {0}")]
    Encode(String),

    /// A stored payload could not be decoded into an event.
    ///
    /// Decode failures are never papered over with a default value. For
    /// `all()` and catch-up replay they abort the whole batch.
    #[error("decode error: {0}")]
    Decode(String),

    // =========================================================================
    // Capability
    // =========================================================================

    /// The backend does not provide the requested capability.
    ///
    /// The in-memory backend returns this from `listen`, so subscribing against
    /// it fails at subscribe time instead of never delivering anything.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// A subscription was requested outside a tokio runtime.
    #[error("no tokio runtime available to run the subscription")]
    NoRuntime,

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Every dedicated subscription connection is already in use.
    #[error("subscription limit reached: {max} concurrent subscriptions")]
    SubscriptionLimit {
        /// Configured subscription budget
        max: usize,
    },

    /// The subscriber fell behind and change signals were dropped.
    ///
    /// # Systems Concept: Bounded Buffers
    ///
    /// Each stream channel buffers a fixed number of signals. A consumer that is
    /// slower than the writer eventually overflows it. Skipping ahead silently
    /// would lose events, so the subscription stops with this error instead.
    #[error("subscription on stream '{stream_id}' lagged: {skipped} signals dropped")]
    SubscriptionLagged {
        /// The stream whose channel overflowed
        stream_id: String,
        /// How many signals were lost
        skipped: u64,
    },

    /// A subscription's background task panicked or was aborted.
    #[error("subscription task failed: {0}")]
    Task(String),

    // =========================================================================
    // Internal
    // =========================================================================

    /// SQLite operation failed.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// The `#[from]` attribute generates `impl From<rusqlite::Error> for Error`,
    /// which is what lets `?` convert rusqlite errors automatically.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema version mismatch or corruption detected.
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for the optimistic concurrency failure.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Error::VersionMismatch { .. })
    }

    /// Returns true when a point lookup found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
