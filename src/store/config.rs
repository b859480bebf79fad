//! Configuration for the typed store.

use crate::error::{Error, Result};

/// Table used when no name is configured
pub const DEFAULT_TABLE_NAME: &str = "records";

/// Errors kept by the side channel when no capacity is configured
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 64;

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name of the redb table holding every entry.
    pub table_name: String,

    /// Page cache size handed to redb when opening a file.
    ///
    /// `None` keeps redb's own default.
    pub cache_size: Option<usize>,

    /// Maximum number of swallowed errors retained for `take_errors`.
    ///
    /// Zero disables the side channel.
    pub error_log_capacity: usize,
}

impl StoreConfig {
    /// Creates a validated configuration.
    ///
    /// # Arguments
    /// * `table_name` - Name of the backing table (must not be empty)
    /// * `cache_size` - Optional redb cache size in bytes (must not be zero)
    /// * `error_log_capacity` - Size of the error side channel
    pub fn new(
        table_name: impl Into<String>,
        cache_size: Option<usize>,
        error_log_capacity: usize,
    ) -> Result<Self> {
        let table_name = table_name.into();
        if table_name.is_empty() {
            return Err(Error::InvalidConfig("table name is empty".to_string()));
        }

        if cache_size == Some(0) {
            return Err(Error::InvalidConfig("cache size must be greater than 0".to_string()));
        }

        Ok(Self {
            table_name,
            cache_size,
            error_log_capacity,
        })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            cache_size: None,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }
}
