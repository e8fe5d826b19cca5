//! JSON codec (`serde_json`).
//!
//! Human-readable and schema-tolerant: unknown fields are ignored on decode,
//! which makes it the default for application events.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use super::{Codec, Decoder, TypeHinted};
use crate::{Error, Result};

/// Encodes events as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// A JSON codec with an empty type-hint registry.
    pub fn typed<E>() -> TypeHinted<JsonCodec, E>
    where
        JsonCodec: Codec<E>,
    {
        TypeHinted::new(JsonCodec)
    }
}

impl<E> Codec<E> for JsonCodec
where
    E: Serialize + DeserializeOwned,
{
    fn marshal(&self, event: &E) -> Result<Vec<u8>> {
        serde_json::to_vec(event).map_err(|e| Error::Encode(e.to_string()))
    }

    fn unmarshal(&self, payload: &[u8]) -> Result<E> {
        serde_json::from_slice(payload).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Decoder that parses a JSON payload as `V` and converts it into `E`.
///
/// Registered per type hint to decode one variant of a sum type.
pub fn decoder<V, E>() -> Decoder<E>
where
    V: DeserializeOwned + Into<E> + 'static,
    E: 'static,
{
    Arc::new(|payload: &[u8]| {
        serde_json::from_slice::<V>(payload)
            .map(Into::into)
            .map_err(|e| Error::Decode(e.to_string()))
    })
}
