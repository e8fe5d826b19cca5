//! Compact binary codec (`bincode`).
//!
//! Schema-free and positional: both sides must agree on the Rust type. The
//! format cannot describe itself, so serde attributes that need
//! self-describing input (`#[serde(untagged)]`, `#[serde(flatten)]`) are not
//! supported; use externally tagged enums or per-hint decoders instead.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use super::{Codec, Decoder, TypeHinted};
use crate::{Error, Result};

/// Encodes events with bincode's default (little-endian, fixed-int) options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// A binary codec with an empty type-hint registry.
    pub fn typed<E>() -> TypeHinted<BinaryCodec, E>
    where
        BinaryCodec: Codec<E>,
    {
        TypeHinted::new(BinaryCodec)
    }
}

impl<E> Codec<E> for BinaryCodec
where
    E: Serialize + DeserializeOwned,
{
    fn marshal(&self, event: &E) -> Result<Vec<u8>> {
        bincode::serialize(event).map_err(|e| Error::Encode(e.to_string()))
    }

    fn unmarshal(&self, payload: &[u8]) -> Result<E> {
        bincode::deserialize(payload).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Decoder that reads a bincode payload as `V` and converts it into `E`.
pub fn decoder<V, E>() -> Decoder<E>
where
    V: DeserializeOwned + Into<E> + 'static,
    E: 'static,
{
    Arc::new(|payload: &[u8]| {
        bincode::deserialize::<V>(payload)
            .map(Into::into)
            .map_err(|e| Error::Decode(e.to_string()))
    })
}
