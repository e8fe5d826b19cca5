//! # Publisher
//!
//! The write side of a stream.
//!
//! ## Rust Pattern: Immutable Builder
//!
//! `with_type` and `expected_version` take `&self` and return a new
//! `Publisher`. A base publisher can therefore be shared (or cloned into
//! tasks) and specialised per call without any shared mutable state:
//!
//! ```rust
//! use streamstore::{EventStore, NoopCodec};
//!
//! let store = EventStore::<String>::in_memory().with_codec(NoopCodec::typed());
//! let base = store.stream("chat").publisher();
//!
//! let v1 = base.with_type("joined").publish(&"ann".to_string()).unwrap();
//! let v2 = base.expected_version(v1).publish(&"hi".to_string()).unwrap();
//! assert!(!v2.is_empty());
//! ```

use std::fmt;

use crate::repository::TypedRepository;
use crate::types::{ExpectedVersion, StreamId, Version};
use crate::Result;

/// Appends typed events to one stream.
pub struct Publisher<E> {
    repository: TypedRepository<E>,
    type_hint: String,
    expected: ExpectedVersion,
}

impl<E> Publisher<E> {
    /// A publisher with no type hint and no concurrency check.
    pub fn new(repository: TypedRepository<E>) -> Self {
        Self {
            repository,
            type_hint: String::new(),
            expected: ExpectedVersion::Any,
        }
    }

    /// A copy that tags subsequent events with `hint`.
    pub fn with_type(&self, hint: impl Into<String>) -> Self {
        Self {
            type_hint: hint.into(),
            ..self.clone()
        }
    }

    /// A copy whose publishes succeed only while `version` is the stream's
    /// current version. An empty version disables the check.
    pub fn expected_version(&self, version: impl Into<ExpectedVersion>) -> Self {
        Self {
            expected: version.into(),
            ..self.clone()
        }
    }

    /// Appends `event` under a freshly generated version and returns it.
    ///
    /// Pass the returned version to [`Publisher::expected_version`] to chain
    /// a follow-up publish that fails if anyone else wrote in between.
    ///
    /// # Errors
    ///
    /// - `Error::VersionMismatch` when the expected version is not current
    /// - `Error::Encode` when the codec rejects the event
    pub fn publish(&self, event: &E) -> Result<Version> {
        let version = Version::generate();
        let event_id =
            self.repository
                .insert_event(&version, &self.type_hint, event, &self.expected)?;

        tracing::debug!(
            stream = %self.repository.stream_id(),
            event = %event_id,
            event_type = %self.type_hint,
            "published"
        );
        Ok(version)
    }

    pub fn stream_id(&self) -> &StreamId {
        self.repository.stream_id()
    }

    pub fn type_hint(&self) -> &str {
        &self.type_hint
    }

    pub fn expected(&self) -> &ExpectedVersion {
        &self.expected
    }
}

impl<E> Clone for Publisher<E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            type_hint: self.type_hint.clone(),
            expected: self.expected.clone(),
        }
    }
}

impl<E> fmt::Debug for Publisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("stream_id", self.stream_id())
            .field("type_hint", &self.type_hint)
            .field("expected", &self.expected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NoopCodec, VersionedCodec};
    use crate::storage::InMemoryEventLog;
    use std::sync::Arc;

    fn publisher() -> Publisher<String> {
        Publisher::new(TypedRepository::new(
            Arc::new(InMemoryEventLog::new()),
            "s1",
            VersionedCodec::new(NoopCodec::typed::<String>()),
        ))
    }

    #[test]
    fn test_configuration_returns_copies() {
        let base = publisher();
        let typed = base.with_type("created");
        let guarded = typed.expected_version("v1");

        assert_eq!(base.type_hint(), "");
        assert!(base.expected().is_any());
        assert_eq!(typed.type_hint(), "created");
        assert!(typed.expected().is_any());
        assert_eq!(guarded.type_hint(), "created");
        assert_eq!(guarded.expected(), &ExpectedVersion::Exact(Version::new("v1")));
    }

    #[test]
    fn test_publish_returns_fresh_versions() {
        let base = publisher();
        let v1 = base.publish(&"a".into()).unwrap();
        let v2 = base.expected_version(v1.clone()).publish(&"b".into()).unwrap();

        assert!(!v1.is_empty());
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_stale_expected_version_rejected() {
        let base = publisher();
        let v1 = base.publish(&"a".into()).unwrap();
        base.publish(&"b".into()).unwrap();

        let err = base
            .expected_version(v1)
            .publish(&"c".into())
            .unwrap_err();
        assert!(err.is_version_mismatch());
    }

    #[test]
    fn test_type_hint_is_stored() {
        let base = publisher();
        base.with_type("greeting").publish(&"hi".into()).unwrap();

        let repo = base.repository.clone();
        let stored = repo.all_raw().unwrap();
        assert_eq!(stored[0].raw.event_type, "greeting");
    }
}
