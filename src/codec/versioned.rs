//! # Version Stamping
//!
//! Events may want to know the storage version they were read at, e.g. to
//! publish a follow-up with `expected_version` set to it. The store assigns
//! versions after the event was encoded, so the value cannot be in the payload;
//! it has to be injected after decoding.
//!
//! ## Rust Pattern: Capability Trait
//!
//! An event type opts in by implementing [`Versioned`]. The wrapper learns
//! about the capability once, when it is built with
//! [`VersionedCodec::stamping`], which is only callable when `E: Versioned`.
//! Decoding then calls a plain function pointer; no runtime type inspection
//! is involved.
//!
//! ```rust
//! use streamstore::codec::{JsonCodec, Versioned, VersionedCodec};
//! use streamstore::{RawEvent, Version};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Item {
//!     name: String,
//!     #[serde(skip)]
//!     version: Version,
//! }
//!
//! impl Versioned for Item {
//!     fn set_version(&mut self, version: &Version) {
//!         self.version = version.clone();
//!     }
//! }
//!
//! let codec = VersionedCodec::new(JsonCodec::typed::<Item>()).stamping();
//! let raw = RawEvent::new(br#"{"name":"pen"}"#.to_vec()).with_version(Version::new("v7"));
//! let item = codec.decode(&raw).unwrap();
//! assert_eq!(item.version.as_str(), "v7");
//! ```

use std::fmt;
use std::sync::Arc;

use super::TypedCodec;
use crate::types::{RawEvent, Version};
use crate::Result;

/// Implemented by event types that carry their own storage version.
pub trait Versioned {
    fn set_version(&mut self, version: &Version);
}

fn stamp_version<E: Versioned>(event: &mut E, version: &Version) {
    event.set_version(version);
}

/// Shared, type-hinted codec plus optional version stamping.
///
/// Cloning is cheap and shares the codec. Reconfiguring a clone leaves the
/// source value untouched.
pub struct VersionedCodec<E> {
    inner: Arc<dyn TypedCodec<E>>,
    stamp: Option<fn(&mut E, &Version)>,
}

impl<E: 'static> VersionedCodec<E> {
    /// Wraps `inner` without stamping.
    pub fn new(inner: impl TypedCodec<E> + 'static) -> Self {
        Self::from_shared(Arc::new(inner))
    }

    /// Wraps an already shared codec without stamping.
    pub fn from_shared(inner: Arc<dyn TypedCodec<E>>) -> Self {
        Self { inner, stamp: None }
    }
}

impl<E> VersionedCodec<E> {
    /// Enables stamping of the stored version onto decoded events.
    pub fn stamping(self) -> Self
    where
        E: Versioned,
    {
        Self {
            inner: self.inner,
            stamp: Some(stamp_version::<E>),
        }
    }

    pub fn is_stamping(&self) -> bool {
        self.stamp.is_some()
    }

    pub fn marshal(&self, event: &E) -> Result<Vec<u8>> {
        self.inner.marshal(event)
    }

    /// Decodes a raw event by its type hint, then stamps its version.
    ///
    /// Events stored without a version are left as decoded.
    pub fn decode(&self, raw: &RawEvent) -> Result<E> {
        let mut event = self.inner.unmarshal_with_type(&raw.event_type, &raw.payload)?;
        if let Some(stamp) = self.stamp {
            if !raw.version.is_empty() {
                stamp(&mut event, &raw.version);
            }
        }
        Ok(event)
    }
}

impl<E> Clone for VersionedCodec<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stamp: self.stamp,
        }
    }
}

impl<E> fmt::Debug for VersionedCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedCodec")
            .field("stamping", &self.is_stamping())
            .finish_non_exhaustive()
    }
}
