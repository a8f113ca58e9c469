//! In-memory TTL cache.
//!
//! Expiry is measured against an injected [`Clock`], so tests can step past a
//! TTL with a [`ManualClock`](crate::mocks::ManualClock) instead of sleeping.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use chrono::{DateTime, Utc};
use conference_central_core::cache::{Cache, CacheError, CacheFuture};
use conference_central_core::environment::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-memory cache for fast, deterministic testing.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.entries.read().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// Cache on wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Cache on an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every operation fail with [`CacheError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether a live entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .read()
            .unwrap()
            .get(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache offline".into()));
        }
        Ok(())
    }
}

impl Cache for InMemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.check_available()?;
            let now = self.clock.now();
            let mut entries = self.entries.write().unwrap();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            let now = self.clock.now();
            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.entries
                .write()
                .unwrap()
                .insert(key, Entry { value, expires_at });
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.entries.write().unwrap().remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ManualClock, test_clock};

    #[tokio::test]
    async fn test_entries_expire_with_clock() {
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let cache = InMemoryCache::with_clock(clock.clone());

        cache
            .set("k".into(), b"v".to_vec(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance(Duration::from_secs(599));
        assert!(cache.contains_key("k"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_and_unavailable() {
        let cache = InMemoryCache::new();
        cache
            .set("k".into(), vec![1], Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        assert!(!cache.contains_key("k"));

        cache.set_unavailable(true);
        assert!(cache.get("k").await.is_err());
        assert!(cache.delete("k").await.is_err());
    }
}
