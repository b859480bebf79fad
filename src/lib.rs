//! Typed convenience layer over a single redb table.
//!
//! Numeric [`Key`]s and free-form string keys share one keyspace, values go
//! through a pluggable [`ValueCodec`], and [`Store::scan`] pages through
//! every entry under a key prefix.

pub mod encoding;
pub mod error;
pub mod store;

// Re-export common types for convenience
pub use encoding::{BincodeCodec, JsonCodec, Key, StoreKey, ValueCodec};
pub use error::{CodecError, Error, Result};
pub use store::{page_window, Page, Store, StoreConfig};
