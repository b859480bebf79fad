//! Value codecs for typed get/set/scan.
//!
//! The store never looks inside stored values. A codec turns any serde type
//! into bytes on write and back on read; raw accessors skip it entirely.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reversible byte serialization for arbitrary typed values.
pub trait ValueCodec {
    /// Serializes a value into its storage bytes.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserializes storage bytes into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError>;
}

/// Compact binary codec backed by bincode. This is the store default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl ValueCodec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        Ok(bincode::deserialize(data)?)
    }
}

/// JSON codec, for stores that should stay readable with external tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(data)?)
    }
}
