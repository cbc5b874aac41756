//! Error types for the cache tables
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for table operations.
///
/// Both variants carry the name of the table the lookup ran against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key not found and no loader configured, or delete of a missing key
    #[error("Key not found in table: {0}")]
    NotFound(String),

    /// Key not found and the configured loader declined to produce it
    #[error("Key not found and not loadable in table: {0}")]
    NotFoundOrLoadable(String),
}

impl CacheError {
    /// Name of the table that produced the error.
    pub fn table(&self) -> &str {
        match self {
            CacheError::NotFound(table) | CacheError::NotFoundOrLoadable(table) => table,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
