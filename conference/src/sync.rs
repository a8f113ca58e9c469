//! Secondary-index and cache synchronizer.
//!
//! Keeps two derived stores eventually consistent with the authoritative
//! conference records:
//!
//! - the search index, one document per conference, refreshed after every
//!   creation and seat change (inline, or via the reindex task queue)
//! - the unfiltered listing cache entry [`LISTING_CACHE_KEY`], invalidated on
//!   every change and repopulated lazily with a TTL backstop
//!
//! Failures here are logged and swallowed: the triggering write has already
//! committed. [`IndexSynchronizer::reconcile`] repairs whatever drift the
//! swallowed failures leave behind.

use crate::config::{IndexingMode, SyncConfig};
use crate::document::{conference_document, document_id};
use crate::error::Result;
use crate::schema::conference_from_entity;
use crate::types::{CONFERENCE_KIND, Conference};
use conference_central_core::Key;
use conference_central_core::cache::Cache;
use conference_central_core::search::SearchIndex;
use conference_central_core::store::{RecordStore, StoreQuery};
use conference_central_runtime::metrics::SyncMetrics;
use conference_central_runtime::{TaskError, TaskHandler, TaskSender};
use conference_central_runtime::tasks::TaskFuture;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cache key of the unfiltered conference listing.
pub const LISTING_CACHE_KEY: &str = "CACHE_NO_FILTERS";

/// Name of the reindex task queue.
pub const REINDEX_QUEUE: &str = "reindex";

/// Refresh the search document of one conference.
///
/// Carries only the key: the handler re-reads the record, so redelivery and
/// reordering are harmless.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReindexTask {
    /// Conference to refresh.
    pub key: Key,
}

/// Outcome of a reconciliation sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Documents examined.
    pub scanned: u64,
    /// Documents overwritten because they had drifted.
    pub updated: u64,
    /// Orphaned documents deleted.
    pub removed: u64,
    /// Conferences that had no document and were indexed.
    pub added: u64,
}

/// Rebuilds search documents from authoritative records.
#[derive(Clone)]
pub struct Reindexer {
    store: Arc<dyn RecordStore>,
    index: Arc<dyn SearchIndex>,
}

impl Reindexer {
    /// Reindexer writing to `index`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    /// Bring the document for `key` in line with the record.
    ///
    /// Upserts the projection, or deletes the document if the record is gone.
    ///
    /// # Errors
    ///
    /// Returns the store or index failure.
    pub async fn reindex(&self, key: &Key) -> Result<()> {
        let doc_id = document_id(key);
        match self.store.get(key).await? {
            Some(stored) => {
                let conference = conference_from_entity(key.clone(), &stored.value)?;
                let outcome = self.index.put(doc_id, conference_document(&conference)).await;
                SyncMetrics::record_index_update(outcome.is_ok());
                outcome?;
                tracing::debug!(conference_key = %key, "Search document refreshed");
            }
            None => {
                self.index.delete(&doc_id).await?;
                SyncMetrics::record_removed(1);
                tracing::debug!(conference_key = %key, "Search document removed");
            }
        }
        Ok(())
    }
}

impl TaskHandler<ReindexTask> for Reindexer {
    fn handle<'a>(&'a self, task: &'a ReindexTask) -> TaskFuture<'a> {
        Box::pin(async move {
            self.reindex(&task.key)
                .await
                .map_err(|err| TaskError::Failed(err.to_string()))
        })
    }
}

/// Propagates conference changes to the search index and listing cache.
pub struct IndexSynchronizer {
    reindexer: Reindexer,
    store: Arc<dyn RecordStore>,
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn Cache>,
    mode: IndexingMode,
    listing_ttl: Duration,
    listing_generation: AtomicU64,
    queue: Option<TaskSender<ReindexTask>>,
}

impl IndexSynchronizer {
    /// Synchronizer over the given collaborators.
    ///
    /// In [`IndexingMode::Deferred`] a queue must be attached with
    /// [`IndexSynchronizer::with_queue`]; until then refreshes run inline.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn Cache>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            reindexer: Reindexer::new(Arc::clone(&store), Arc::clone(&index)),
            store,
            index,
            cache,
            mode: config.mode,
            listing_ttl: config.listing_cache_ttl(),
            listing_generation: AtomicU64::new(0),
            queue: None,
        }
    }

    /// Route deferred refreshes through `queue`.
    #[must_use]
    pub fn with_queue(mut self, queue: TaskSender<ReindexTask>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// The task handler, for spawning the reindex queue.
    #[must_use]
    pub fn reindexer(&self) -> Reindexer {
        self.reindexer.clone()
    }

    /// Indexing mode.
    #[must_use]
    pub const fn mode(&self) -> IndexingMode {
        self.mode
    }

    /// React to a committed creation or seat change.
    ///
    /// The listing cache is invalidated before returning so the next
    /// unfiltered read is fresh. The document refresh is inline or queued
    /// depending on the mode. Never fails.
    pub async fn conference_changed(&self, key: &Key) {
        self.invalidate_listing().await;

        match (self.mode, &self.queue) {
            (IndexingMode::Deferred, Some(queue)) => {
                if let Err(err) = queue.submit(ReindexTask { key: key.clone() }) {
                    tracing::warn!(
                        conference_key = %key,
                        error = %err,
                        "Reindex not scheduled; reconciliation will repair the document"
                    );
                }
            }
            _ => {
                if let Err(err) = self.reindexer.reindex(key).await {
                    tracing::warn!(
                        conference_key = %key,
                        error = %err,
                        "Search document refresh failed"
                    );
                }
            }
        }
    }

    /// Delete the unfiltered listing cache entry. Never fails.
    ///
    /// Bumps the listing generation first, so a listing read before this
    /// call is never cached after it.
    pub async fn invalidate_listing(&self) {
        self.listing_generation.fetch_add(1, Ordering::SeqCst);
        self.evict_listing().await;
    }

    async fn evict_listing(&self) {
        if let Err(err) = self.cache.delete(LISTING_CACHE_KEY).await {
            tracing::warn!(error = %err, "Listing cache invalidation failed");
        }
    }

    /// Cached unfiltered listing, if present and readable.
    pub async fn cached_listing(&self) -> Option<Vec<Conference>> {
        match self.cache.get(LISTING_CACHE_KEY).await {
            Ok(Some(bytes)) => match bincode::deserialize::<Vec<Conference>>(&bytes) {
                Ok(listing) => {
                    SyncMetrics::record_cache("hit");
                    Some(listing)
                }
                Err(err) => {
                    SyncMetrics::record_cache("error");
                    tracing::warn!(error = %err, "Discarding unreadable listing cache entry");
                    None
                }
            },
            Ok(None) => {
                SyncMetrics::record_cache("miss");
                None
            }
            Err(err) => {
                SyncMetrics::record_cache("error");
                tracing::warn!(error = %err, "Listing cache read failed");
                None
            }
        }
    }

    /// Generation to pass to [`IndexSynchronizer::store_listing`]; take it
    /// before reading the listing from the store.
    #[must_use]
    pub fn listing_generation(&self) -> u64 {
        self.listing_generation.load(Ordering::SeqCst)
    }

    /// Store the unfiltered listing with the configured TTL. Never fails.
    ///
    /// `generation` is the value of
    /// [`IndexSynchronizer::listing_generation`] taken before the listing was
    /// read. Nothing is stored if an invalidation happened since, and an
    /// invalidation racing the write deletes the entry again.
    pub async fn store_listing(&self, listing: &[Conference], generation: u64) {
        if self.listing_generation() != generation {
            tracing::debug!("Listing changed while it was read; not caching");
            return;
        }
        let bytes = match bincode::serialize(listing) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "Listing not cacheable");
                return;
            }
        };
        if let Err(err) = self
            .cache
            .set(LISTING_CACHE_KEY.to_string(), bytes, self.listing_ttl)
            .await
        {
            tracing::warn!(error = %err, "Listing cache write failed");
            return;
        }
        if self.listing_generation() != generation {
            self.evict_listing().await;
        }
    }

    /// Repair drift between the records and the search index.
    ///
    /// Deletes documents whose key does not decode or whose record is gone,
    /// overwrites documents that differ from the current projection, indexes
    /// conferences that have no document, then clears the listing cache.
    /// Every write is conditional on what was just read, so the sweep is
    /// idempotent and safe alongside live traffic.
    ///
    /// # Errors
    ///
    /// Returns the first store or index failure; work done before it stays.
    #[tracing::instrument(skip(self), name = "reconcile")]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut indexed = BTreeSet::new();

        for (doc_id, document) in self.index.list().await? {
            report.scanned += 1;

            let key = match Key::decode(&doc_id) {
                Ok(key) if key.kind() == CONFERENCE_KIND => key,
                _ => {
                    self.index.delete(&doc_id).await?;
                    report.removed += 1;
                    continue;
                }
            };

            let Some(stored) = self.store.get(&key).await? else {
                self.index.delete(&doc_id).await?;
                report.removed += 1;
                continue;
            };

            let conference = match conference_from_entity(key.clone(), &stored.value) {
                Ok(conference) => conference,
                Err(err) => {
                    tracing::error!(conference_key = %key, error = %err, "Skipping corrupt record");
                    indexed.insert(key);
                    continue;
                }
            };
            let expected = conference_document(&conference);
            if expected != document {
                self.index.put(doc_id, expected).await?;
                report.updated += 1;
            }
            indexed.insert(key);
        }

        let all = self.store.query(&StoreQuery::new(CONFERENCE_KIND)).await?;
        for (key, entity) in all {
            if indexed.contains(&key) {
                continue;
            }
            match conference_from_entity(key.clone(), &entity) {
                Ok(conference) => {
                    self.index
                        .put(document_id(&key), conference_document(&conference))
                        .await?;
                    report.added += 1;
                }
                Err(err) => {
                    tracing::error!(conference_key = %key, error = %err, "Skipping corrupt record");
                }
            }
        }

        self.invalidate_listing().await;

        SyncMetrics::record_removed(report.removed);
        SyncMetrics::record_reconcile();
        tracing::info!(
            scanned = report.scanned,
            updated = report.updated,
            removed = report.removed,
            added = report.added,
            "Reconciliation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::conference_to_entity;
    use crate::types::PROFILE_KIND;
    use conference_central_core::search::SearchEngine;
    use conference_central_testing::{InMemoryCache, InMemoryRecordStore, InMemorySearchEngine};

    struct Fixture {
        store: Arc<InMemoryRecordStore>,
        index: Arc<dyn SearchIndex>,
        cache: Arc<InMemoryCache>,
        sync: IndexSynchronizer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRecordStore::new());
        let index = InMemorySearchEngine::new().open("Conference").unwrap();
        let cache = Arc::new(InMemoryCache::new());
        let sync = IndexSynchronizer::new(
            store.clone(),
            Arc::clone(&index),
            cache.clone(),
            &Config::for_tests().sync,
        );
        Fixture {
            store,
            index,
            cache,
            sync,
        }
    }

    fn conference(id: i64, seats: u32) -> Conference {
        Conference {
            key: Key::with_id(CONFERENCE_KIND, id).with_parent(Key::named(PROFILE_KIND, "u")),
            name: format!("conf-{id}"),
            description: String::new(),
            organizer_display_name: String::new(),
            topics: Vec::new(),
            city: "Paris".into(),
            start_date: None,
            end_date: None,
            month: 0,
            max_attendees: 10,
            seats_available: seats,
        }
    }

    #[tokio::test]
    async fn test_reindex_follows_the_record() {
        let f = fixture();
        let c = conference(1, 10);
        f.store.insert(c.key.clone(), conference_to_entity(&c));

        f.sync.conference_changed(&c.key).await;
        assert_eq!(f.index.list().await.unwrap().len(), 1);

        f.store.remove(&c.key);
        f.sync.reindexer().reindex(&c.key).await.unwrap();
        assert!(f.index.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_cache_round_trip_and_invalidation() {
        let f = fixture();
        assert!(f.sync.cached_listing().await.is_none());

        let listing = vec![conference(1, 3), conference(2, 4)];
        f.sync.store_listing(&listing, f.sync.listing_generation()).await;
        assert_eq!(f.sync.cached_listing().await.unwrap(), listing);

        f.sync.conference_changed(&listing[0].key).await;
        assert!(!f.cache.contains_key(LISTING_CACHE_KEY));
    }

    #[tokio::test]
    async fn test_listing_read_before_an_invalidation_is_not_cached() {
        let f = fixture();
        let generation = f.sync.listing_generation();
        let before = vec![conference(1, 3)];

        let created = conference(2, 10);
        f.store.insert(created.key.clone(), conference_to_entity(&created));
        f.sync.conference_changed(&created.key).await;

        f.sync.store_listing(&before, generation).await;
        assert!(!f.cache.contains_key(LISTING_CACHE_KEY));
        assert!(f.sync.cached_listing().await.is_none());

        f.sync.store_listing(&before, f.sync.listing_generation()).await;
        assert!(f.cache.contains_key(LISTING_CACHE_KEY));
    }

    #[tokio::test]
    async fn test_reconcile_repairs_every_kind_of_drift() {
        let f = fixture();
        let kept = conference(1, 10);
        let drifted = conference(2, 10);
        let missing = conference(3, 10);
        let orphan = conference(4, 10);
        for c in [&kept, &drifted, &missing] {
            f.store.insert(c.key.clone(), conference_to_entity(c));
        }
        for c in [&kept, &drifted, &orphan] {
            f.index
                .put(document_id(&c.key), conference_document(c))
                .await
                .unwrap();
        }
        f.index
            .put("garbage".into(), conference_document(&kept))
            .await
            .unwrap();
        let changed = conference(2, 7);
        f.store.insert(changed.key.clone(), conference_to_entity(&changed));
        f.sync
            .store_listing(&[kept.clone()], f.sync.listing_generation())
            .await;

        let report = f.sync.reconcile().await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                scanned: 4,
                updated: 1,
                removed: 2,
                added: 1,
            }
        );
        assert!(!f.cache.contains_key(LISTING_CACHE_KEY));

        let again = f.sync.reconcile().await.unwrap();
        assert_eq!(again.updated + again.removed + again.added, 0);
        assert_eq!(again.scanned, 3);
    }
}
