//! Shared fixtures for the service integration tests.

#![allow(dead_code)] // Each test binary uses a different subset
#![allow(clippy::unwrap_used)]

use conference_central::notify::{NotifyError, NotifyFuture};
use conference_central::{Config, ConferenceApi, ConferenceForm, Identity, Notifier};
use conference_central_core::Key;
use conference_central_core::entity::Entity;
use conference_central_core::environment::Clock;
use conference_central_core::store::{Commit, RecordStore, StoreFuture, StoreQuery, Versioned};
use conference_central_testing::{
    InMemoryCache, InMemoryRecordStore, InMemorySearchEngine, ManualClock, test_clock,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Notifier that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Delivery("mailer offline".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        })
    }
}

/// Record store that can slow down reads and commits, or hold one query open.
#[derive(Debug, Default)]
pub struct SlowStore {
    inner: InMemoryRecordStore,
    get_delay: Mutex<Duration>,
    commit_delay: Mutex<Duration>,
    held_query: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl SlowStore {
    pub fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn delay_gets(&self, by: Duration) {
        *self.get_delay.lock().unwrap() = by;
    }

    pub fn delay_commits(&self, by: Duration) {
        *self.commit_delay.lock().unwrap() = by;
    }

    /// Hold the next query after it has read its rows.
    ///
    /// Returns a receiver that fires once the rows are read, and the sender
    /// that lets the query return them.
    pub fn hold_next_query(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.held_query.lock().unwrap() = Some((reached_tx, release_rx));
        (reached_rx, release_tx)
    }
}

impl RecordStore for SlowStore {
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Versioned<Entity>>> {
        Box::pin(async move {
            let delay = *self.get_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            self.inner.get(key).await
        })
    }

    fn put(&self, key: Key, entity: Entity) -> StoreFuture<'_, Key> {
        self.inner.put(key, entity)
    }

    fn commit(&self, commit: Commit) -> StoreFuture<'_, Vec<Key>> {
        Box::pin(async move {
            let delay = *self.commit_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            self.inner.commit(commit).await
        })
    }

    fn query<'a>(&'a self, query: &'a StoreQuery) -> StoreFuture<'a, Vec<(Key, Entity)>> {
        Box::pin(async move {
            let rows = self.inner.query(query).await?;
            let held = self.held_query.lock().unwrap().take();
            if let Some((reached, release)) = held {
                let _ = reached.send(());
                let _ = release.await;
            }
            Ok(rows)
        })
    }
}

/// A service wired over in-memory adapters, with handles to each of them.
pub struct Harness {
    pub api: ConferenceApi,
    pub store: InMemoryRecordStore,
    pub search: InMemorySearchEngine,
    pub cache: InMemoryCache,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&Config::for_tests())
    }

    pub fn with_config(config: &Config) -> Self {
        let store = InMemoryRecordStore::new();
        Self::over(config, store.clone(), Arc::new(store))
    }

    /// Service over a [`SlowStore`] wrapping the harness store.
    pub fn slow(config: &Config) -> (Self, Arc<SlowStore>) {
        let store = InMemoryRecordStore::new();
        let slow = Arc::new(SlowStore::new(store.clone()));
        (Self::over(config, store, slow.clone()), slow)
    }

    fn over(config: &Config, store: InMemoryRecordStore, backing: Arc<dyn RecordStore>) -> Self {
        let search = InMemorySearchEngine::new();
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let cache = InMemoryCache::with_clock(clock.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let api = ConferenceApi::new(
            config,
            backing,
            &search,
            Arc::new(cache.clone()),
            notifier.clone(),
        )
        .unwrap();
        Self {
            api,
            store,
            search,
            cache,
            clock,
            notifier,
        }
    }

    /// Create a conference as [`organizer`] and return its encoded key.
    pub async fn create(&self, form: ConferenceForm) -> String {
        self.api
            .create_conference(Some(&organizer()), &form)
            .await
            .unwrap()
            .key
            .encode()
    }

    pub async fn seats(&self, key: &str) -> u32 {
        self.api.get_conference(key).await.unwrap().seats_available
    }
}

pub fn organizer() -> Identity {
    Identity::new("organizer", "organizer@example.com")
}

pub fn attendee(n: usize) -> Identity {
    Identity::new(format!("attendee-{n}"), format!("attendee-{n}@example.com"))
}

pub fn conference_form(name: &str, city: &str, max_attendees: u32, start: &str) -> ConferenceForm {
    ConferenceForm {
        name: name.to_string(),
        city: city.to_string(),
        start_date: Some(start.to_string()),
        max_attendees: Some(max_attendees.into()),
        ..ConferenceForm::default()
    }
}

pub fn dotgo() -> ConferenceForm {
    ConferenceForm {
        topics: vec!["Go".into(), "Systems".into()],
        ..conference_form("dotGo", "Paris", 1, "2016-10-10")
    }
}
