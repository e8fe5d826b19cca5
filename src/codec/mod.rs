//! # Event Codecs
//!
//! A codec turns a typed event into the payload bytes stored in the log, and
//! back. The log itself never looks inside a payload.
//!
//! ## Layers
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────┐
//!   │ VersionedCodec<E>   decode + stamp storage version        │
//!   │   └─ dyn TypedCodec<E>   dispatch on type hint            │
//!   │        └─ TypeHinted<C, E>   hint → Decoder<E> registry   │
//!   │             └─ C: Codec<E>   JsonCodec | BinaryCodec |    │
//!   │                              NoopCodec                    │
//!   └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Polymorphic Events
//!
//! A stream often carries several event shapes behind one Rust type, usually an
//! enum. Each shape is stored with a type hint, and a decoder is registered per
//! hint. Unknown or empty hints fall back to the wrapped codec's own decoder.
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use streamstore::codec::{json, Codec, JsonCodec, TypeHinted, TypedCodec};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Opened { id: u32 }
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Closed { id: u32 }
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! #[serde(untagged)]
//! enum Account { Opened(Opened), Closed(Closed) }
//!
//! impl From<Opened> for Account { fn from(e: Opened) -> Self { Account::Opened(e) } }
//! impl From<Closed> for Account { fn from(e: Closed) -> Self { Account::Closed(e) } }
//!
//! let codec = TypeHinted::new(JsonCodec)
//!     .with_type("opened", json::decoder::<Opened, Account>())
//!     .with_type("closed", json::decoder::<Closed, Account>());
//!
//! let bytes = codec.marshal(&Account::Closed(Closed { id: 7 })).unwrap();
//! let back = codec.unmarshal_with_type("closed", &bytes).unwrap();
//! assert_eq!(back, Account::Closed(Closed { id: 7 }));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::Result;

pub mod binary;
pub mod json;
pub mod noop;
pub mod versioned;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use noop::NoopCodec;
pub use versioned::{Versioned, VersionedCodec};

// =============================================================================
// Traits
// =============================================================================

/// Marshals events of type `E` to payload bytes and back.
///
/// Implementations must round-trip: `unmarshal(marshal(e)?)? == e` for every
/// value they accept.
pub trait Codec<E>: Send + Sync {
    fn marshal(&self, event: &E) -> Result<Vec<u8>>;
    fn unmarshal(&self, payload: &[u8]) -> Result<E>;
}

/// A decoder registered for one type hint.
pub type Decoder<E> = Arc<dyn Fn(&[u8]) -> Result<E> + Send + Sync>;

/// A codec that can pick a decoder by type hint.
pub trait TypedCodec<E>: Codec<E> {
    /// Registers (or replaces) the decoder used for `hint`.
    fn register_type(&mut self, hint: &str, decoder: Decoder<E>);

    /// Decodes with the decoder registered for `hint`, or with
    /// [`Codec::unmarshal`] if there is none.
    fn unmarshal_with_type(&self, hint: &str, payload: &[u8]) -> Result<E>;
}

// =============================================================================
// TypeHinted
// =============================================================================

/// Adds a type-hint registry to any [`Codec`].
///
/// # Rust Pattern: Builder by Value
///
/// `with_type` consumes and returns `self`, so a fully registered codec can be
/// built in one expression and then shared immutably.
pub struct TypeHinted<C, E> {
    inner: C,
    decoders: HashMap<String, Decoder<E>>,
}

impl<C, E> TypeHinted<C, E>
where
    C: Codec<E>,
{
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            decoders: HashMap::new(),
        }
    }

    /// Registers `decoder` for `hint`.
    pub fn with_type(mut self, hint: impl Into<String>, decoder: Decoder<E>) -> Self {
        self.decoders.insert(hint.into(), decoder);
        self
    }

    /// The wrapped default codec.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns true if a decoder is registered for `hint`.
    pub fn is_registered(&self, hint: &str) -> bool {
        self.decoders.contains_key(hint)
    }
}

impl<C, E> Codec<E> for TypeHinted<C, E>
where
    C: Codec<E>,
{
    fn marshal(&self, event: &E) -> Result<Vec<u8>> {
        self.inner.marshal(event)
    }

    fn unmarshal(&self, payload: &[u8]) -> Result<E> {
        self.inner.unmarshal(payload)
    }
}

impl<C, E> TypedCodec<E> for TypeHinted<C, E>
where
    C: Codec<E>,
{
    fn register_type(&mut self, hint: &str, decoder: Decoder<E>) {
        self.decoders.insert(hint.to_string(), decoder);
    }

    fn unmarshal_with_type(&self, hint: &str, payload: &[u8]) -> Result<E> {
        match self.decoders.get(hint) {
            Some(decode) if !hint.is_empty() => decode(payload),
            _ => self.inner.unmarshal(payload),
        }
    }
}

impl<C: fmt::Debug, E> fmt::Debug for TypeHinted<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hints: Vec<&String> = self.decoders.keys().collect();
        hints.sort();
        f.debug_struct("TypeHinted")
            .field("inner", &self.inner)
            .field("hints", &hints)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
