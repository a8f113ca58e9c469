//! Record store abstraction.
//!
//! The record store is the authoritative source of truth. It offers:
//!
//! - Point reads and writes of [`Entity`] values addressed by [`Key`]
//! - Optimistic multi-entity transactions ([`Transaction`]) that fail with
//!   [`StoreError::Conflict`] when anything they read changed before commit
//! - Ordered queries ([`StoreQuery`]) restricted the way an ordered range
//!   index restricts them: at most one property may carry an inequality, and
//!   the first sort order must be on that property
//!
//! # Transactions
//!
//! A transaction records the version of every entity it reads and buffers its
//! writes. On [`Transaction::commit`] the store checks the recorded versions
//! against the current ones and applies every write or none of them.
//!
//! ```no_run
//! use conference_central_core::store::{RecordStore, StoreError, Transaction, TransactionOptions};
//! use conference_central_core::Key;
//!
//! async fn bump(store: &dyn RecordStore, key: &Key) -> Result<(), StoreError> {
//!     let mut tx = Transaction::begin(store, TransactionOptions::single_group());
//!     let mut entity = tx.get(key).await?.unwrap_or_default();
//!     let count = entity.int("COUNT").unwrap_or(0);
//!     entity.set("COUNT", count + 1);
//!     tx.put(key.clone(), entity);
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use crate::entity::{Entity, EntityError, Value};
use crate::key::Key;
use crate::operator::Operator;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by [`RecordStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Maximum number of entity groups a cross-group transaction may touch.
pub const MAX_CROSS_GROUPS: usize = 25;

/// Pseudo-property that filters on the entity key.
///
/// The operand is the key's encoded form as [`Value::Text`]; only equality
/// operators are meaningful.
pub const KEY_PROPERTY: &str = "__key__";

/// Errors that can occur during record store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An entity read by the transaction changed before commit.
    #[error("transaction conflict on {key}")]
    Conflict {
        /// The first entity found to have changed.
        key: Key,
    },

    /// The transaction did not complete in time.
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),

    /// The transaction touched more entity groups than its options allow.
    #[error("transaction spans {groups} entity groups")]
    CrossGroup {
        /// Number of distinct groups touched.
        groups: usize,
    },

    /// The query violates the ordered index restrictions.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A stored entity could not be interpreted.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// A read was attempted with a key that has no id.
    #[error("incomplete key: {0}")]
    IncompleteKey(Key),

    /// The store could not be reached.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the failure is transient contention that is safe to retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout(_))
    }
}

/// A value paired with the store version it was read at.
///
/// Versions start at 1 for the first write; version 0 denotes absence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The stored value.
    pub value: T,
    /// Version of the value.
    pub version: u64,
}

/// Options for a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Allow the transaction to span more than one entity group.
    pub cross_group: bool,
}

impl TransactionOptions {
    /// Confine the transaction to one entity group.
    #[must_use]
    pub const fn single_group() -> Self {
        Self { cross_group: false }
    }

    /// Allow the transaction to span up to [`MAX_CROSS_GROUPS`] groups.
    #[must_use]
    pub const fn cross_group() -> Self {
        Self { cross_group: true }
    }
}

/// The unit a [`RecordStore`] applies atomically.
#[derive(Clone, Debug, Default)]
pub struct Commit {
    /// Transaction options.
    pub options: TransactionOptions,
    /// Version observed for each key read (0 for absent).
    pub reads: BTreeMap<Key, u64>,
    /// Buffered writes, in submission order.
    pub writes: Vec<(Key, Entity)>,
}

impl Commit {
    /// Check the group span against the options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CrossGroup`] when the commit touches more groups
    /// than allowed.
    pub fn check_groups(&self) -> Result<(), StoreError> {
        let groups: BTreeSet<&Key> = self
            .reads
            .keys()
            .chain(self.writes.iter().map(|(key, _)| key))
            .map(Key::root)
            .collect();
        let limit = if self.options.cross_group {
            MAX_CROSS_GROUPS
        } else {
            1
        };
        if groups.len() > limit {
            return Err(StoreError::CrossGroup {
                groups: groups.len(),
            });
        }
        Ok(())
    }
}

/// Authoritative entity storage.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn RecordStore>`.
pub trait RecordStore: Send + Sync {
    /// Read an entity and its version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IncompleteKey`] for keys without an id and
    /// [`StoreError::Unavailable`] if the store cannot be reached.
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Versioned<Entity>>>;

    /// Write an entity outside of any transaction.
    ///
    /// An incomplete key is completed with a fresh id; the stored key is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be reached.
    fn put(&self, key: Key, entity: Entity) -> StoreFuture<'_, Key>;

    /// Atomically validate reads and apply writes.
    ///
    /// Returns the stored keys of the writes, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if any read version is stale and
    /// [`StoreError::CrossGroup`] if the group span is not allowed. Nothing
    /// is written on error.
    fn commit(&self, commit: Commit) -> StoreFuture<'_, Vec<Key>>;

    /// Run an ordered query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] if [`StoreQuery::validate`] fails.
    fn query<'a>(&'a self, query: &'a StoreQuery) -> StoreFuture<'a, Vec<(Key, Entity)>>;
}

/// An optimistic transaction over a [`RecordStore`].
///
/// Reads take `&self` so independent reads can be awaited concurrently.
pub struct Transaction<'s> {
    store: &'s dyn RecordStore,
    options: TransactionOptions,
    reads: Mutex<BTreeMap<Key, u64>>,
    writes: Vec<(Key, Entity)>,
}

impl<'s> Transaction<'s> {
    /// Start a transaction.
    #[must_use]
    pub fn begin(store: &'s dyn RecordStore, options: TransactionOptions) -> Self {
        Self {
            store,
            options,
            reads: Mutex::new(BTreeMap::new()),
            writes: Vec::new(),
        }
    }

    /// Read an entity and record its version.
    ///
    /// # Errors
    ///
    /// Propagates store errors. Returns [`StoreError::Conflict`] if the same
    /// key was already read at a different version.
    pub async fn get(&self, key: &Key) -> Result<Option<Entity>, StoreError> {
        let read = self.store.get(key).await?;
        let version = read.as_ref().map_or(0, |v| v.version);

        let mut reads = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
        match reads.get(key) {
            Some(seen) if *seen != version => {
                return Err(StoreError::Conflict { key: key.clone() });
            }
            Some(_) => {}
            None => {
                reads.insert(key.clone(), version);
            }
        }
        Ok(read.map(|v| v.value))
    }

    /// Buffer a write; nothing is visible until commit.
    pub fn put(&mut self, key: Key, entity: Entity) {
        self.writes.push((key, entity));
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Commit all buffered writes atomically.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::commit`].
    pub async fn commit(self) -> Result<Vec<Key>, StoreError> {
        let reads = self
            .reads
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let commit = Commit {
            options: self.options,
            reads,
            writes: self.writes,
        };
        commit.check_groups()?;
        self.store.commit(commit).await
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One property restriction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyFilter {
    /// Stored property name.
    pub property: String,
    /// Comparison.
    pub operator: Operator,
    /// Operand.
    pub value: Value,
}

/// One sort order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    /// Stored property name.
    pub property: String,
    /// Direction.
    pub direction: Direction,
}

/// An ordered query over one entity kind.
///
/// # Examples
///
/// ```
/// use conference_central_core::store::StoreQuery;
/// use conference_central_core::Operator;
///
/// let query = StoreQuery::new("Conference")
///     .filter("CITY", Operator::Eq, "Paris")
///     .filter("MONTH", Operator::Gt, 3_i64)
///     .order("MONTH")
///     .order("NAME");
/// assert!(query.validate().is_ok());
///
/// let illegal = StoreQuery::new("Conference")
///     .filter("MONTH", Operator::Gt, 3_i64)
///     .filter("MAX_ATTENDEES", Operator::Lt, 10_i64);
/// assert!(illegal.validate().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreQuery {
    /// Entity kind.
    pub kind: String,
    /// Restrict to descendants of this key.
    pub ancestor: Option<Key>,
    /// Conjunctive filters.
    pub filters: Vec<PropertyFilter>,
    /// Sort orders, most significant first.
    pub orders: Vec<Order>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl StoreQuery {
    /// Query over every entity of `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    /// Add a filter.
    #[must_use]
    pub fn filter(
        mut self,
        property: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(PropertyFilter {
            property: property.into(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Add an ascending sort order.
    #[must_use]
    pub fn order(mut self, property: impl Into<String>) -> Self {
        self.orders.push(Order {
            property: property.into(),
            direction: Direction::Ascending,
        });
        self
    }

    /// Add a descending sort order.
    #[must_use]
    pub fn order_desc(mut self, property: impl Into<String>) -> Self {
        self.orders.push(Order {
            property: property.into(),
            direction: Direction::Descending,
        });
        self
    }

    /// Restrict to descendants of `key`.
    #[must_use]
    pub fn ancestor(mut self, key: Key) -> Self {
        self.ancestor = Some(key);
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The property carrying inequality filters, if any.
    #[must_use]
    pub fn inequality_property(&self) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.operator.is_inequality())
            .map(|f| f.property.as_str())
    }

    /// Check the ordered index restrictions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] if two distinct properties carry
    /// inequality filters, or if the first sort order is not on the
    /// inequality property.
    pub fn validate(&self) -> Result<(), StoreError> {
        let inequalities: BTreeSet<&str> = self
            .filters
            .iter()
            .filter(|f| f.operator.is_inequality())
            .map(|f| f.property.as_str())
            .collect();
        if inequalities.len() > 1 {
            let names: Vec<&str> = inequalities.into_iter().collect();
            return Err(StoreError::InvalidQuery(format!(
                "inequality filters on multiple properties: {}",
                names.join(", ")
            )));
        }
        if let (Some(property), Some(first)) = (inequalities.first(), self.orders.first()) {
            if first.property != *property {
                return Err(StoreError::InvalidQuery(format!(
                    "first sort order must be on inequality property {property}, not {}",
                    first.property
                )));
            }
        }
        Ok(())
    }

    /// Whether `entity` stored under `key` satisfies the kind, ancestor and
    /// filters of this query.
    #[must_use]
    pub fn matches(&self, key: &Key, entity: &Entity) -> bool {
        if key.kind() != self.kind {
            return false;
        }
        if let Some(ancestor) = &self.ancestor {
            if !key.has_ancestor(ancestor) {
                return false;
            }
        }
        self.filters.iter().all(|f| {
            if f.property == KEY_PROPERTY {
                return Value::Text(key.encode()).matches(f.operator, &f.value);
            }
            entity
                .get(&f.property)
                .is_some_and(|value| value.matches(f.operator, &f.value))
        })
    }

    /// Compare two entities by this query's sort orders.
    ///
    /// Entities missing a sort property order before those that have it.
    #[must_use]
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        for order in &self.orders {
            let ordering = match (a.get(&order.property), b.get(&order.property)) {
                (Some(x), Some(y)) => x.sort_cmp(y),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match order.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_field_inequalities_are_legal() {
        let query = StoreQuery::new("Conference")
            .filter("MONTH", Operator::Ge, 1_i64)
            .filter("MONTH", Operator::Le, 6_i64)
            .filter("CITY", Operator::Eq, "Paris");
        assert!(query.validate().is_ok());
        assert_eq!(query.inequality_property(), Some("MONTH"));
    }

    #[test]
    fn test_first_order_must_follow_inequality() {
        let query = StoreQuery::new("Conference")
            .filter("MONTH", Operator::Gt, 1_i64)
            .order("NAME");
        assert!(matches!(query.validate(), Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn test_matches_requires_property() {
        let query = StoreQuery::new("Conference").filter("CITY", Operator::Ne, "Paris");
        let key = Key::with_id("Conference", 1);
        assert!(!query.matches(&key, &Entity::new()));
        assert!(query.matches(&key, &Entity::new().with("CITY", "London")));
        assert!(!query.matches(&Key::with_id("Profile", 1), &Entity::new().with("CITY", "London")));
    }

    #[test]
    fn test_key_pseudo_property() {
        let key = Key::with_id("Conference", 3);
        let encoded = key.encode();
        let query = StoreQuery::new("Conference").filter(KEY_PROPERTY, Operator::Eq, encoded.as_str());
        assert!(query.matches(&key, &Entity::new()));
        assert!(!query.matches(&Key::with_id("Conference", 4), &Entity::new()));
    }

    #[test]
    fn test_ancestor_restriction() {
        let parent = Key::named("Profile", "a");
        let query = StoreQuery::new("Conference").ancestor(parent.clone());
        assert!(query.matches(&Key::with_id("Conference", 1).with_parent(parent), &Entity::new()));
        assert!(!query.matches(
            &Key::with_id("Conference", 1).with_parent(Key::named("Profile", "b")),
            &Entity::new()
        ));
    }

    #[test]
    fn test_compare_uses_orders_in_sequence() {
        let query = StoreQuery::new("Conference").order("MONTH").order_desc("NAME");
        let a = Entity::new().with("MONTH", 1_i64).with("NAME", "a");
        let b = Entity::new().with("MONTH", 1_i64).with("NAME", "b");
        let c = Entity::new().with("MONTH", 2_i64).with("NAME", "a");
        assert_eq!(query.compare(&a, &b), Ordering::Greater);
        assert_eq!(query.compare(&b, &c), Ordering::Less);
        assert_eq!(query.compare(&Entity::new(), &a), Ordering::Less);
    }

    #[test]
    fn test_group_span() {
        let a = Key::named("Profile", "a");
        let b = Key::named("Profile", "b");
        let mut commit = Commit::default();
        commit.reads.insert(a.clone(), 1);
        commit.writes.push((Key::with_id("Conference", 1).with_parent(a), Entity::new()));
        assert!(commit.check_groups().is_ok());

        commit.writes.push((b, Entity::new()));
        assert_eq!(commit.check_groups(), Err(StoreError::CrossGroup { groups: 2 }));

        commit.options = TransactionOptions::cross_group();
        assert!(commit.check_groups().is_ok());
    }
}
