//! Key and value encoding for storage.
//!
//! This module handles the binary format for numeric keys and the pluggable
//! serialization used for typed values.

pub mod key;
pub mod value;

pub use key::{is_numeric_key, Key, StoreKey, ENCODED_KEY_LEN, KEY_MARKER};
pub use value::{BincodeCodec, JsonCodec, ValueCodec};
