//! Conference creation, lookup and queries.

use crate::config::QueryBackend;
use crate::document::conference_from_document;
use crate::error::{Result, ServiceError};
use crate::notify::{CONFIRMATION_SUBJECT, Notifier, confirmation_body};
use crate::profile::ProfileService;
use crate::query::{ConferenceQuery, ConferenceQueryForm, QueryPlan};
use crate::schema::{NAME, conference_from_entity, conference_to_entity};
use crate::sync::IndexSynchronizer;
use crate::types::{CONFERENCE_KIND, Conference, ConferenceForm, Identity, require_identity};
use conference_central_core::Key;
use conference_central_core::search::SearchIndex;
use conference_central_core::store::{RecordStore, StoreQuery};
use futures::future::join_all;
use std::sync::Arc;

/// Conference operations other than registration.
pub struct ConferenceService {
    store: Arc<dyn RecordStore>,
    index: Arc<dyn SearchIndex>,
    sync: Arc<IndexSynchronizer>,
    profiles: Arc<ProfileService>,
    notifier: Arc<dyn Notifier>,
    backend: QueryBackend,
}

impl ConferenceService {
    /// Service over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        index: Arc<dyn SearchIndex>,
        sync: Arc<IndexSynchronizer>,
        profiles: Arc<ProfileService>,
        notifier: Arc<dyn Notifier>,
        backend: QueryBackend,
    ) -> Self {
        Self {
            store,
            index,
            sync,
            profiles,
            notifier,
            backend,
        }
    }

    /// Create a conference owned by the caller.
    ///
    /// The record is stored under the caller's profile; the search document
    /// and listing cache follow through the synchronizer, and a confirmation
    /// is sent to the caller. Neither follow-up can fail the call.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without an identity, `Validation` for a bad
    /// form and `Internal` if the store fails.
    #[tracing::instrument(skip_all, fields(name = %form.name))]
    pub async fn create_conference(
        &self,
        identity: Option<&Identity>,
        form: &ConferenceForm,
    ) -> Result<Conference> {
        let identity = require_identity(identity)?;
        let profile = self.profiles.load(identity).await?;
        let organizer = if profile.display_name.is_empty() {
            identity.email.clone()
        } else {
            profile.display_name
        };

        let pending = Key::incomplete(CONFERENCE_KIND).with_parent(identity.profile_key());
        let mut conference = Conference::from_form(pending.clone(), organizer, form)?;
        conference.key = self
            .store
            .put(pending, conference_to_entity(&conference))
            .await?;
        tracing::info!(conference_key = %conference.key, "Conference created");

        self.sync.conference_changed(&conference.key).await;

        let body = confirmation_body(&conference);
        if let Err(err) = self
            .notifier
            .send(&identity.email, CONFIRMATION_SUBJECT, &body)
            .await
        {
            tracing::warn!(conference_key = %conference.key, error = %err, "Confirmation not sent");
        }

        Ok(conference)
    }

    /// Look up one conference by its encoded key.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed key and `NotFound` if nothing is
    /// stored under it.
    #[tracing::instrument(skip(self))]
    pub async fn get_conference(&self, conference_key: &str) -> Result<Conference> {
        let key = Key::decode(conference_key)?;
        if key.kind() != CONFERENCE_KIND {
            return Err(not_found(conference_key));
        }
        let stored = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| not_found(conference_key))?;
        Ok(conference_from_entity(key, &stored.value)?)
    }

    /// Run a filtered or unfiltered conference query.
    ///
    /// Without filters the listing is served from the cache when possible and
    /// repopulates it on a miss. Filtered queries run on the configured
    /// backend; search results are ordered by start date, then name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an illegal filter set and `Internal` if the
    /// store or index fails.
    #[tracing::instrument(skip_all, fields(filters = form.filters.len()))]
    pub async fn query_conferences(&self, form: &ConferenceQueryForm) -> Result<Vec<Conference>> {
        let query = ConferenceQuery::parse(form)?;
        match query.compile(self.backend)? {
            QueryPlan::Listing(listing) => {
                if let Some(cached) = self.sync.cached_listing().await {
                    return Ok(cached);
                }
                let generation = self.sync.listing_generation();
                let conferences = self.run_store_query(&listing).await?;
                self.sync.store_listing(&conferences, generation).await;
                Ok(conferences)
            }
            QueryPlan::Search(search) => {
                tracing::debug!(expression = %search, "Searching conferences");
                let mut conferences = self
                    .index
                    .search(&search)
                    .await?
                    .iter()
                    .map(|(_, document)| conference_from_document(document))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                conferences.sort_by(|a, b| {
                    a.start_date
                        .cmp(&b.start_date)
                        .then_with(|| a.name.cmp(&b.name))
                });
                Ok(conferences)
            }
            QueryPlan::Store(store_query) => self.run_store_query(&store_query).await,
        }
    }

    /// Conferences the caller created, by name.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without an identity and `Internal` if the store
    /// fails.
    #[tracing::instrument(skip_all)]
    pub async fn conferences_created(&self, identity: Option<&Identity>) -> Result<Vec<Conference>> {
        let identity = require_identity(identity)?;
        let query = StoreQuery::new(CONFERENCE_KIND)
            .ancestor(identity.profile_key())
            .order(NAME);
        self.run_store_query(&query).await
    }

    /// Conferences the caller holds a seat at, in registration order.
    ///
    /// Keys are resolved concurrently; keys that no longer resolve are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without an identity and `Internal` if the store
    /// fails.
    #[tracing::instrument(skip_all)]
    pub async fn conferences_to_attend(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<Conference>> {
        let identity = require_identity(identity)?;
        let profile = self.profiles.load(identity).await?;

        let reads = join_all(
            profile
                .conference_keys
                .iter()
                .map(|key| self.store.get(key)),
        )
        .await;

        let mut conferences = Vec::with_capacity(reads.len());
        for (key, read) in profile.conference_keys.iter().zip(reads) {
            match read? {
                Some(stored) => conferences.push(conference_from_entity(key.clone(), &stored.value)?),
                None => tracing::debug!(conference_key = %key, "Skipping registration for missing conference"),
            }
        }
        Ok(conferences)
    }

    async fn run_store_query(&self, query: &StoreQuery) -> Result<Vec<Conference>> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|(key, entity)| conference_from_entity(key, &entity).map_err(ServiceError::from))
            .collect()
    }
}

fn not_found(conference_key: &str) -> ServiceError {
    ServiceError::NotFound(format!("no conference found with key: {conference_key}"))
}
