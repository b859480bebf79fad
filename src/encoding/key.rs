//! Numeric key encoding and the storage key abstraction.
//!
//! Numeric keys share the keyspace with free-form string keys, so they are
//! tagged with a two byte marker:
//!
//! Numeric key: [b'@'][b'k'][value as u32 little-endian]

use std::borrow::Cow;
use std::fmt;

/// Marker prefixed to every encoded numeric key
pub const KEY_MARKER: [u8; 2] = *b"@k";

/// Length of an encoded numeric key (marker + u32)
pub const ENCODED_KEY_LEN: usize = KEY_MARKER.len() + 4;

/// A 32-bit numeric record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key(u32);

impl Key {
    /// Creates a key from its numeric value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the numeric value of the key.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Encodes the key into its 6 byte storage form.
    pub fn encode(self) -> [u8; ENCODED_KEY_LEN] {
        let value = self.0.to_le_bytes();
        [
            KEY_MARKER[0],
            KEY_MARKER[1],
            value[0],
            value[1],
            value[2],
            value[3],
        ]
    }

    /// Decodes a storage key back into a numeric key.
    ///
    /// Anything that is not an encoded numeric key (wrong length, missing
    /// marker, empty) decodes to `Key(0)`, which cannot be told apart from a
    /// genuine key 0. Use [`is_numeric_key`] when the distinction matters.
    pub fn decode(bytes: &[u8]) -> Self {
        if !is_numeric_key(bytes) {
            return Key(0);
        }

        Key(u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]))
    }

    /// Parses the decimal form of a key.
    ///
    /// Empty, signed, non-numeric or out of range input yields `Key(0)`.
    pub fn from_string(s: &str) -> Self {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Key(0);
        }

        s.parse::<u32>().map(Key).unwrap_or_default()
    }
}

/// Returns true if `bytes` has the shape of an encoded numeric key.
pub fn is_numeric_key(bytes: &[u8]) -> bool {
    bytes.len() == ENCODED_KEY_LEN && bytes.starts_with(&KEY_MARKER)
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key(value)
    }
}

impl From<Key> for u32 {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// Anything that can address an entry in the store.
///
/// Numeric keys are stored in their encoded form, string and byte keys are
/// stored verbatim. Both kinds go through the exact same store operations.
pub trait StoreKey {
    /// Returns the bytes used as the storage key.
    fn key_bytes(&self) -> Cow<'_, [u8]>;
}

impl StoreKey for Key {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.encode().to_vec())
    }
}

impl StoreKey for &str {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl StoreKey for String {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl StoreKey for &String {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl StoreKey for &[u8] {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl<const N: usize> StoreKey for &[u8; N] {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_slice())
    }
}

impl StoreKey for Vec<u8> {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_slice())
    }
}

/// Hex form of a storage key for diagnostics, cut to the first 20 bytes.
pub(crate) struct TruncatedKey<'a>(pub &'a [u8]);

impl TruncatedKey<'_> {
    const MAX_LEN: usize = 20;
}

impl fmt::Display for TruncatedKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.len().min(Self::MAX_LEN);
        for byte in &self.0[..end] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
