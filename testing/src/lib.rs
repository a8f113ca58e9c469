//! # Conference Central Testing
//!
//! In-memory doubles for the collaborators defined in
//! `conference-central-core`.
//!
//! This crate provides:
//! - [`InMemoryRecordStore`]: versioned entity storage with optimistic
//!   transactions, ancestor queries and conflict injection
//! - [`InMemorySearchEngine`]: named indexes that evaluate search clauses
//! - [`InMemoryCache`]: a TTL cache driven by an injected clock
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//!
//! ## Example
//!
//! ```
//! use conference_central_testing::{InMemoryCache, InMemoryRecordStore, InMemorySearchEngine};
//! use conference_central_core::search::{SearchEngine, SearchIndex};
//!
//! let store = InMemoryRecordStore::new();
//! let search = InMemorySearchEngine::new();
//! let cache = InMemoryCache::new();
//!
//! let index = search.open("conferences").unwrap();
//! assert_eq!(index.name(), "conferences");
//! # let _ = (store, cache);
//! ```

use chrono::{DateTime, Utc};
use conference_central_core::environment::Clock;

/// In-memory record store
pub mod record_store;

/// In-memory search engine
pub mod search_index;

/// In-memory TTL cache
pub mod cache;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{PoisonError, RwLock};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use conference_central_testing::mocks::FixedClock;
    /// use conference_central_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(next) = chrono::Duration::from_std(by)
                .ok()
                .and_then(|by| time.checked_add_signed(by))
            {
                *time = next;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2016-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_451_606_400, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use cache::InMemoryCache;
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use record_store::InMemoryRecordStore;
pub use search_index::{InMemorySearchEngine, InMemorySearchIndex};
