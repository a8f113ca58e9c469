//! In-memory record store.
//!
//! Implements [`RecordStore`] with real optimistic-concurrency semantics:
//! every write stamps the entity with a fresh version from a store-wide
//! counter, and a commit fails with [`StoreError::Conflict`] if any version
//! it read has since moved. Concurrent transactions therefore race exactly as
//! they would against a production store.
//!
//! Fault injection:
//! - [`InMemoryRecordStore::inject_conflicts`] fails the next `n` commits
//! - [`InMemoryRecordStore::set_unavailable`] fails every operation

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use conference_central_core::Key;
use conference_central_core::entity::Entity;
use conference_central_core::store::{Commit, RecordStore, StoreError, StoreFuture, StoreQuery, Versioned};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<Key, Versioned<Entity>>,
    last_version: u64,
}

impl State {
    fn write(&mut self, key: Key, entity: Entity) {
        self.last_version += 1;
        self.entities.insert(
            key,
            Versioned {
                value: entity,
                version: self.last_version,
            },
        );
    }

    fn version(&self, key: &Key) -> u64 {
        self.entities.get(key).map_or(0, |v| v.version)
    }
}

/// In-memory record store for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use conference_central_testing::InMemoryRecordStore;
/// use conference_central_core::store::RecordStore;
/// use conference_central_core::entity::Entity;
/// use conference_central_core::Key;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRecordStore::new();
/// let key = store.put(Key::incomplete("Conference"), Entity::new().with("NAME", "dotGo")).await?;
///
/// let stored = store.get(&key).await?.unwrap();
/// assert_eq!(stored.value.text("NAME")?, "dotGo");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<State>>,
    next_id: Arc<AtomicI64>,
    injected_conflicts: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` commits with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delete an entity directly, bypassing transactions.
    pub fn remove(&self, key: &Key) -> Option<Entity> {
        self.state
            .write()
            .unwrap()
            .entities
            .remove(key)
            .map(|v| v.value)
    }

    /// Overwrite an entity directly, bypassing transactions.
    pub fn insert(&self, key: Key, entity: Entity) {
        self.state.write().unwrap().write(key, entity);
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().entities.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every entity of `kind`.
    #[must_use]
    pub fn keys_of_kind(&self, kind: &str) -> Vec<Key> {
        self.state
            .read()
            .unwrap()
            .entities
            .keys()
            .filter(|key| key.kind() == kind)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }

    fn complete(&self, key: Key) -> Key {
        if key.id().is_some() {
            return key;
        }
        key.completed(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Versioned<Entity>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.check_available()?;
            if !key.is_complete() {
                return Err(StoreError::IncompleteKey(key.clone()));
            }
            Ok(self.state.read().unwrap().entities.get(key).cloned())
        })
    }

    fn put(&self, key: Key, entity: Entity) -> StoreFuture<'_, Key> {
        Box::pin(async move {
            self.check_available()?;
            let key = self.complete(key);
            self.state.write().unwrap().write(key.clone(), entity);
            Ok(key)
        })
    }

    fn commit(&self, commit: Commit) -> StoreFuture<'_, Vec<Key>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.check_available()?;
            commit.check_groups()?;

            let mut state = self.state.write().unwrap();

            if self.take_injected_conflict() {
                let key = commit
                    .reads
                    .keys()
                    .next()
                    .cloned()
                    .or_else(|| commit.writes.first().map(|(key, _)| key.clone()))
                    .unwrap_or_else(|| Key::incomplete("Unknown"));
                return Err(StoreError::Conflict { key });
            }

            if let Some((key, _)) = commit
                .reads
                .iter()
                .find(|(key, version)| state.version(key) != **version)
            {
                return Err(StoreError::Conflict { key: key.clone() });
            }

            let mut keys = Vec::with_capacity(commit.writes.len());
            for (key, entity) in commit.writes {
                let key = self.complete(key);
                state.write(key.clone(), entity);
                keys.push(key);
            }
            Ok(keys)
        })
    }

    fn query<'a>(&'a self, query: &'a StoreQuery) -> StoreFuture<'a, Vec<(Key, Entity)>> {
        Box::pin(async move {
            self.check_available()?;
            query.validate()?;

            let state = self.state.read().unwrap();
            let mut results: Vec<(Key, Entity)> = state
                .entities
                .iter()
                .filter(|(key, stored)| query.matches(key, &stored.value))
                .map(|(key, stored)| (key.clone(), stored.value.clone()))
                .collect();
            drop(state);

            results.sort_by(|(ka, a), (kb, b)| query.compare(a, b).then_with(|| ka.cmp(kb)));
            if let Some(limit) = query.limit {
                results.truncate(limit);
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_central_core::Operator;
    use conference_central_core::store::{Transaction, TransactionOptions};

    #[tokio::test]
    async fn test_put_allocates_distinct_ids() {
        let store = InMemoryRecordStore::new();
        let a = store.put(Key::incomplete("C"), Entity::new()).await.unwrap();
        let b = store.put(Key::incomplete("C"), Entity::new()).await.unwrap();
        assert!(a.is_complete());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_stale_read_conflicts() {
        let store = InMemoryRecordStore::new();
        let key = Key::named("Counter", "c");
        store.insert(key.clone(), Entity::new().with("N", 0_i64));

        let tx = Transaction::begin(&store, TransactionOptions::single_group());
        let _ = tx.get(&key).await.unwrap();
        store.insert(key.clone(), Entity::new().with("N", 5_i64));

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = InMemoryRecordStore::new();
        let a = Key::named("P", "a");
        let b = Key::named("P", "b");

        let mut tx = Transaction::begin(&store, TransactionOptions::single_group());
        tx.put(a.clone(), Entity::new());
        tx.put(b.clone(), Entity::new());
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::CrossGroup { groups: 2 })
        ));
        assert!(store.is_empty());

        store.inject_conflicts(1);
        let mut tx = Transaction::begin(&store, TransactionOptions::cross_group());
        tx.put(a.clone(), Entity::new());
        tx.put(b.clone(), Entity::new());
        assert!(tx.commit().await.unwrap_err().is_conflict());
        assert!(store.is_empty());

        let mut tx = Transaction::begin(&store, TransactionOptions::cross_group());
        tx.put(a, Entity::new());
        tx.put(b, Entity::new());
        assert_eq!(tx.commit().await.unwrap().len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = InMemoryRecordStore::new();
        for (name, month) in [("b", 3_i64), ("a", 3), ("c", 1), ("d", 9)] {
            store
                .put(
                    Key::incomplete("Conference"),
                    Entity::new().with("NAME", name).with("MONTH", month),
                )
                .await
                .unwrap();
        }

        let query = StoreQuery::new("Conference")
            .filter("MONTH", Operator::Le, 3_i64)
            .order("MONTH")
            .order("NAME");
        let names: Vec<String> = store
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|(_, e)| e.text("NAME").unwrap().to_string())
            .collect();
        assert_eq!(names, ["c", "a", "b"]);

        let illegal = StoreQuery::new("Conference")
            .filter("MONTH", Operator::Gt, 1_i64)
            .filter("NAME", Operator::Lt, "z");
        assert!(matches!(
            store.query(&illegal).await,
            Err(StoreError::InvalidQuery(_))
        ));
    }
}
