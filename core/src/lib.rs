//! # Conference Central Core
//!
//! Core traits and types shared by every Conference Central crate.
//!
//! The registration engine, the query filter compiler and the index/cache
//! synchronizer all talk to three external collaborators. This crate defines
//! those collaborators as traits so that production adapters and the
//! in-memory doubles in `conference-central-testing` are interchangeable:
//!
//! - **Record store** ([`store::RecordStore`]): authoritative, strongly
//!   consistent entity storage with ancestor grouping, optimistic multi-entity
//!   transactions and ordered queries
//! - **Search index** ([`search::SearchIndex`]): best-effort full-text
//!   projection queried with a [`search::SearchQuery`] expression
//! - **Cache** ([`cache::Cache`]): key/value bytes with a time-to-live
//!
//! ## Data Flow
//!
//! ```text
//!   write ──► Transaction ──► RecordStore (authoritative)
//!                                   │ commit ok
//!                                   ▼
//!                            synchronizer (best effort)
//!                              │              │
//!                              ▼              ▼
//!                         SearchIndex       Cache
//! ```
//!
//! Nothing in this crate performs I/O; it only describes it.

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};

/// Opaque, URL-safe entity keys with ancestor paths
pub mod key;

/// Comparison operators shared by store filters and search clauses
pub mod operator;

/// Property-bag entities stored in the record store
pub mod entity;

/// Record store trait, transactions and ordered queries
pub mod store;

/// Search index trait, documents and query expressions
pub mod search;

/// Cache trait for TTL-bounded byte values
pub mod cache;

/// Environment module - Dependency injection traits
///
/// Time is abstracted behind [`Clock`](environment::Clock) so TTL handling
/// can be tested deterministically.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use conference_central_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use key::{Key, KeyError, KeyId};
pub use operator::Operator;
