//! Profile reads and edits.

use crate::error::{Result, ServiceError};
use crate::schema::{profile_from_entity, profile_to_entity};
use crate::types::{Identity, Profile, ProfileForm, require_identity};
use conference_central_core::store::{RecordStore, Transaction, TransactionOptions};
use conference_central_runtime::RetryPolicy;
use conference_central_runtime::retry::retry_if;
use std::sync::Arc;

/// Profile operations.
pub struct ProfileService {
    store: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl ProfileService {
    /// Service over `store`, retrying write conflicts with `retry`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The caller's profile.
    ///
    /// A caller without a stored profile gets a default one carrying their
    /// email; nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] without an identity and
    /// `Internal` if the store fails.
    #[tracing::instrument(skip_all)]
    pub async fn get_profile(&self, identity: Option<&Identity>) -> Result<Profile> {
        let identity = require_identity(identity)?;
        self.load(identity).await
    }

    /// Update the caller's display name and tee-shirt size.
    ///
    /// The registration set is carried over from the stored profile inside a
    /// version-checked transaction, so a concurrent registration is never
    /// lost.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without an identity, `Concurrency` if write
    /// contention outlasted the retries, and `Internal` if the store fails.
    #[tracing::instrument(skip_all)]
    pub async fn save_profile(&self, identity: Option<&Identity>, form: &ProfileForm) -> Result<()> {
        let identity = require_identity(identity)?;
        retry_if(
            &self.retry,
            || self.save_once(identity, form),
            ServiceError::is_retryable,
        )
        .await?;
        tracing::info!(user_id = %identity.user_id, "Profile saved");
        Ok(())
    }

    pub(crate) async fn load(&self, identity: &Identity) -> Result<Profile> {
        match self.store.get(&identity.profile_key()).await? {
            Some(stored) => Ok(profile_from_entity(&identity.email, &stored.value)?),
            None => Ok(Profile::for_identity(identity)),
        }
    }

    async fn save_once(&self, identity: &Identity, form: &ProfileForm) -> Result<()> {
        let key = identity.profile_key();
        let mut tx = Transaction::begin(self.store.as_ref(), TransactionOptions::single_group());
        let mut profile = match tx.get(&key).await? {
            Some(entity) => profile_from_entity(&identity.email, &entity)?,
            None => Profile::for_identity(identity),
        };
        profile.display_name.clone_from(&form.display_name);
        profile.tee_shirt_size = form.tee_shirt_size;
        tx.put(key, profile_to_entity(&profile));
        tx.commit().await?;
        Ok(())
    }
}
