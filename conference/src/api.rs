//! The service facade exposed to the (external) RPC shell.
//!
//! [`ConferenceApi`] wires the collaborators together once and exposes the
//! nine public operations plus the synchronizer's maintenance hooks.

use crate::config::{Config, IndexingMode};
use crate::conference::ConferenceService;
use crate::error::Result;
use crate::notify::Notifier;
use crate::profile::ProfileService;
use crate::query::ConferenceQueryForm;
use crate::registration::RegistrationManager;
use crate::sync::{IndexSynchronizer, REINDEX_QUEUE, ReconcileReport, ReindexTask};
use crate::types::{Conference, ConferenceForm, Identity, Profile, ProfileForm};
use conference_central_core::cache::Cache;
use conference_central_core::search::SearchEngine;
use conference_central_core::store::RecordStore;
use conference_central_runtime::{RetryPolicy, TaskQueue, TaskQueueConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

struct Reconciler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Conference Central service.
///
/// # Runtime
///
/// With [`IndexingMode::Deferred`] or a reconcile interval configured,
/// [`ConferenceApi::new`] spawns background tasks and must be called inside a
/// Tokio runtime. Call [`ConferenceApi::shutdown`] to drain them.
pub struct ConferenceApi {
    profiles: Arc<ProfileService>,
    conferences: ConferenceService,
    registrations: RegistrationManager,
    sync: Arc<IndexSynchronizer>,
    queue: Option<TaskQueue<ReindexTask>>,
    reconciler: Mutex<Option<Reconciler>>,
}

impl ConferenceApi {
    /// Wire the service.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ServiceError::Internal`] if the search index cannot be
    /// opened.
    pub fn new(
        config: &Config,
        store: Arc<dyn RecordStore>,
        search: &dyn SearchEngine,
        cache: Arc<dyn Cache>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let index = search.open(&config.sync.index_name)?;

        let mut sync = IndexSynchronizer::new(
            Arc::clone(&store),
            Arc::clone(&index),
            cache,
            &config.sync,
        );
        let queue = (config.sync.mode == IndexingMode::Deferred).then(|| {
            let queue_config = TaskQueueConfig {
                capacity: config.sync.queue_capacity,
                max_attempts: config.sync.task_max_attempts,
                retry: RetryPolicy::builder()
                    .initial_delay(config.sync.task_retry_delay())
                    .build(),
            };
            TaskQueue::spawn(REINDEX_QUEUE, queue_config, Arc::new(sync.reindexer()))
        });
        if let Some(queue) = &queue {
            sync = sync.with_queue(queue.sender());
        }
        let sync = Arc::new(sync);

        let conflict_retry = RetryPolicy::builder()
            .max_retries(config.registration.conflict_retries)
            .initial_delay(config.registration.conflict_retry_delay())
            .build();
        let profiles = Arc::new(ProfileService::new(Arc::clone(&store), conflict_retry));
        let conferences = ConferenceService::new(
            Arc::clone(&store),
            index,
            Arc::clone(&sync),
            Arc::clone(&profiles),
            notifier,
            config.query.filtered_backend,
        );
        let registrations =
            RegistrationManager::new(store, Arc::clone(&sync), config.registration.clone());

        let reconciler = config
            .sync
            .reconcile_interval()
            .map(|period| spawn_reconciler(Arc::clone(&sync), period));

        tracing::info!(
            mode = %config.sync.mode,
            index = %config.sync.index_name,
            "Conference service ready"
        );

        Ok(Self {
            profiles,
            conferences,
            registrations,
            sync,
            queue,
            reconciler: Mutex::new(reconciler),
        })
    }

    /// See [`ProfileService::get_profile`].
    ///
    /// # Errors
    ///
    /// See [`ProfileService::get_profile`].
    pub async fn get_profile(&self, identity: Option<&Identity>) -> Result<Profile> {
        self.profiles.get_profile(identity).await
    }

    /// See [`ProfileService::save_profile`].
    ///
    /// # Errors
    ///
    /// See [`ProfileService::save_profile`].
    pub async fn save_profile(&self, identity: Option<&Identity>, form: &ProfileForm) -> Result<()> {
        self.profiles.save_profile(identity, form).await
    }

    /// See [`ConferenceService::create_conference`].
    ///
    /// # Errors
    ///
    /// See [`ConferenceService::create_conference`].
    pub async fn create_conference(
        &self,
        identity: Option<&Identity>,
        form: &ConferenceForm,
    ) -> Result<Conference> {
        self.conferences.create_conference(identity, form).await
    }

    /// See [`ConferenceService::get_conference`].
    ///
    /// # Errors
    ///
    /// See [`ConferenceService::get_conference`].
    pub async fn get_conference(&self, conference_key: &str) -> Result<Conference> {
        self.conferences.get_conference(conference_key).await
    }

    /// See [`ConferenceService::query_conferences`].
    ///
    /// # Errors
    ///
    /// See [`ConferenceService::query_conferences`].
    pub async fn query_conferences(&self, form: &ConferenceQueryForm) -> Result<Vec<Conference>> {
        self.conferences.query_conferences(form).await
    }

    /// See [`ConferenceService::conferences_created`].
    ///
    /// # Errors
    ///
    /// See [`ConferenceService::conferences_created`].
    pub async fn conferences_created(&self, identity: Option<&Identity>) -> Result<Vec<Conference>> {
        self.conferences.conferences_created(identity).await
    }

    /// See [`ConferenceService::conferences_to_attend`].
    ///
    /// # Errors
    ///
    /// See [`ConferenceService::conferences_to_attend`].
    pub async fn conferences_to_attend(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<Conference>> {
        self.conferences.conferences_to_attend(identity).await
    }

    /// See [`RegistrationManager::register`].
    ///
    /// # Errors
    ///
    /// See [`RegistrationManager::register`].
    pub async fn register(&self, identity: Option<&Identity>, conference_key: &str) -> Result<()> {
        self.registrations.register(identity, conference_key).await
    }

    /// See [`RegistrationManager::cancel`].
    ///
    /// # Errors
    ///
    /// See [`RegistrationManager::cancel`].
    pub async fn cancel(&self, identity: Option<&Identity>, conference_key: &str) -> Result<()> {
        self.registrations.cancel(identity, conference_key).await
    }

    /// Run one reconciliation sweep now.
    ///
    /// # Errors
    ///
    /// See [`IndexSynchronizer::reconcile`].
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.sync.reconcile().await
    }

    /// Wait until every queued reindex task has finished.
    ///
    /// Returns immediately in inline mode.
    pub async fn wait_for_indexing(&self) {
        if let Some(queue) = &self.queue {
            queue.wait_idle().await;
        }
    }

    /// Stop the periodic reconciler and drain the reindex queue.
    pub async fn shutdown(&self) {
        if let Some(reconciler) = self.reconciler.lock().await.take() {
            let _ = reconciler.stop.send(true);
            if let Err(err) = reconciler.handle.await {
                tracing::error!(error = %err, "Reconciler task panicked");
            }
        }
        if let Some(queue) = &self.queue {
            queue.shutdown().await;
        }
        tracing::info!("Conference service stopped");
    }
}

fn spawn_reconciler(sync: Arc<IndexSynchronizer>, period: Duration) -> Reconciler {
    let (stop, mut stopped) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        // The first tick completes immediately; skip it.
        ticks.tick().await;
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    if let Err(err) = sync.reconcile().await {
                        tracing::error!(error = %err, "Periodic reconciliation failed");
                    }
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
    });
    Reconciler { stop, handle }
}

