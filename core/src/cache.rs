//! Cache abstraction.
//!
//! A byte-valued key/value cache with per-entry time-to-live. Callers own the
//! encoding of values. Entries may disappear at any time, so a cache miss is
//! never an error.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by [`Cache`] methods.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Errors that can occur during cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// A TTL-bounded byte cache.
pub trait Cache: Send + Sync {
    /// Fetch a live entry; `None` on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache is unreachable.
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>>;

    /// Store an entry that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache is unreachable.
    fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> CacheFuture<'_, ()>;

    /// Remove an entry. Removing a missing entry succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache is unreachable.
    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}
