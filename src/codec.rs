//! Value <-> bytes conversion.
//!
//! A [`Codec`] turns keys and values into the opaque byte strings a backend
//! stores. The only law a codec must honour is the round trip:
//! `decode(encode(v))` is observationally equal to `v`. Encodings need not be
//! canonical, which is why change detection always compares freshly encoded
//! bytes instead of values.

use crate::error::CodecError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serializer used by a shelf for both keys and values.
pub trait Codec: Send + Sync {
    /// Serialize `value` to bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a value previously produced by [`Codec::encode`]
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Compact binary codec built on bincode's serde integration.
///
/// Uses bincode's standard configuration (variable-length integers,
/// little endian) so the byte layout matches the rest of the store family.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    #[inline]
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let (value, _len) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(value)
    }
}

/// Self-describing JSON codec.
///
/// Larger and slower than [`BincodeCodec`], but the stored bytes stay
/// readable by other tools. Maps must have string-like keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
