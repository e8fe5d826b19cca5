//! Passthrough codec for payloads that are already bytes or text.

use super::{Codec, TypeHinted};
use crate::{Error, Result};

/// Stores `String` events as their UTF-8 bytes and `Vec<u8>` events as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl NoopCodec {
    /// A passthrough codec with an empty type-hint registry.
    pub fn typed<E>() -> TypeHinted<NoopCodec, E>
    where
        NoopCodec: Codec<E>,
    {
        TypeHinted::new(NoopCodec)
    }
}

impl Codec<String> for NoopCodec {
    fn marshal(&self, event: &String) -> Result<Vec<u8>> {
        Ok(event.as_bytes().to_vec())
    }

    fn unmarshal(&self, payload: &[u8]) -> Result<String> {
        String::from_utf8(payload.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }
}

impl Codec<Vec<u8>> for NoopCodec {
    fn marshal(&self, event: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(event.clone())
    }

    fn unmarshal(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }
}
