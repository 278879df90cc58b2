//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::session::StoredCookie;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },

    #[error("Read failed: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("Write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("Close failed: {0}")]
    Close(#[source] rusqlite::Error),

    #[error("Storage is closed")]
    Closed,

    #[error("Malformed {namespace} value for key '{key}': {message}")]
    Decode {
        namespace: &'static str,
        key: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Two independent namespaces live behind this trait: the highest post id
/// per blog and the serialized session cookies per domain key. Every call is
/// its own transaction; nothing is held open between calls.
pub trait Storage {
    // ===== Progress Cursors =====

    /// Gets the highest post id recorded for a blog
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing has been recorded for this blog
    /// * `Ok(Some(id))` - The stored cursor
    /// * `Err(StorageError::Decode)` - The stored value is not a valid id
    fn get_highest_id(&self, blog_name: &str) -> StorageResult<Option<i64>>;

    /// Records the highest post id for a blog, replacing any previous value
    ///
    /// The write is durable once this returns.
    fn set_highest_id(&mut self, blog_name: &str, highest_id: i64) -> StorageResult<()>;

    /// Lists every recorded cursor, ordered by blog name
    fn list_highest_ids(&self) -> StorageResult<Vec<(String, i64)>>;

    // ===== Session Cookies =====

    /// Gets the cookies stored under a domain key
    ///
    /// Returns an empty list when nothing is stored.
    fn get_cookies(&self, domain_key: &str) -> StorageResult<Vec<StoredCookie>>;

    /// Replaces the cookies stored under a domain key in a single write
    fn set_cookies(&mut self, domain_key: &str, cookies: &[StoredCookie]) -> StorageResult<()>;

    // ===== Lifecycle =====

    /// Releases the backing resource
    ///
    /// Any call made after this returns `StorageError::Closed`.
    fn close(&mut self) -> StorageResult<()>;
}
