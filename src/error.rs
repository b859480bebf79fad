//! Crate-scoped error handling for redb-typed.
//!
//! The fallible `try_*` operations of the store return these errors
//! directly. The convenience operations log them and push them to the
//! store's error side channel instead.

use thiserror::Error as ThisError;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while turning values into bytes and back.
#[derive(Debug, ThisError)]
pub enum CodecError {
    /// bincode rejected the value or the bytes
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    /// serde_json rejected the value or the bytes
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main error type exposed to users of the crate.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Any failure reported by the underlying redb database
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    /// The value could not be serialized
    #[error("Failed to encode value: {0}")]
    Encode(#[source] CodecError),

    /// The stored bytes could not be deserialized into the requested type
    #[error("Failed to decode value: {0}")]
    Decode(#[source] CodecError),

    /// Invalid store configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true if this error came from the value codec on read.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::Storage(err.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::Storage(err.into())
    }
}
