//! Store configuration.
//!
//! The only externally supplied setting is the connection string (the SQLite
//! database path). Everything else has a default suited to a single process
//! and is overridden with struct-update syntax:
//!
//! ```rust
//! use streamstore::StoreConfig;
//!
//! let config = StoreConfig {
//!     max_subscriptions: 64,
//!     ..StoreConfig::new("events.db")
//! };
//! assert_eq!(config.read_pool_size, streamstore::config::DEFAULT_READ_POOL_SIZE);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Environment variable holding the connection string.
pub const DATABASE_ENV: &str = "STREAMSTORE_DATABASE";

/// Read-only connections shared by point reads and scans.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Dedicated connections available to subscriptions.
///
/// Each live subscription holds one for its whole lifetime.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 32;

/// Signals buffered per stream channel before a slow subscriber lags.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 1024;

/// How long a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// StoreConfig
// =============================================================================

/// Configuration for a SQLite-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file. Created on first open.
    pub path: PathBuf,

    /// Number of pooled read-only connections.
    pub read_pool_size: usize,

    /// Maximum number of concurrently active subscriptions.
    pub max_subscriptions: usize,

    /// Per-stream signal buffer.
    pub notify_capacity: usize,

    /// SQLite busy timeout applied to every connection.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("streamstore.db"),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl StoreConfig {
    /// Default configuration for the given database path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Reads the connection string from `STREAMSTORE_DATABASE`.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`StoreConfig::from_env`], with the variable source injected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        match lookup(DATABASE_ENV) {
            Some(path) if !path.trim().is_empty() => Ok(Self::new(path.trim())),
            _ => Err(Error::Config(format!("{DATABASE_ENV} is not set"))),
        }
    }

    /// Checks the budgets are usable.
    pub fn validate(&self) -> Result<()> {
        if self.read_pool_size == 0 {
            return Err(Error::Config("read_pool_size must be at least 1".into()));
        }
        if self.notify_capacity == 0 {
            return Err(Error::Config("notify_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
