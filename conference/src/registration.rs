//! Registration transaction manager.
//!
//! Register and cancel couple two mutations that must land together: the
//! profile's registration set and the conference's seat counter. Both
//! entities are read concurrently inside one cross-group optimistic
//! transaction, the business rules are decided on what was read, and both
//! writes are committed as a unit. A lost write race surfaces as
//! [`ServiceError::Concurrency`] and is retried a bounded number of times;
//! business rejections ([`RegistrationConflict`]) are never retried.
//!
//! After a successful commit the synchronizer is told about the seat change.
//! That step is best effort and cannot fail the operation.

use crate::config::RegistrationConfig;
use crate::error::{RegistrationConflict, Result, ServiceError};
use crate::schema::{
    conference_from_entity, conference_to_entity, profile_from_entity, profile_to_entity,
};
use crate::sync::IndexSynchronizer;
use crate::types::{CONFERENCE_KIND, Identity, Profile, require_identity};
use conference_central_core::Key;
use conference_central_core::store::{RecordStore, StoreError, Transaction, TransactionOptions};
use conference_central_runtime::RetryPolicy;
use conference_central_runtime::metrics::RegistrationMetrics;
use conference_central_runtime::retry::retry_if;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The two registration mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Take a seat.
    Register,
    /// Give a seat back.
    Cancel,
}

impl Operation {
    /// Metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a conference key for register and cancel.
///
/// # Errors
///
/// Returns [`ServiceError::NotFound`] if the key is malformed or does not
/// address a conference.
pub fn resolve_conference_key(raw: &str) -> Result<Key> {
    match Key::decode(raw) {
        Ok(key) if key.kind() == CONFERENCE_KIND => Ok(key),
        _ => Err(ServiceError::NotFound(format!("no conference found with key: {raw}"))),
    }
}

/// Runs register and cancel transactions.
pub struct RegistrationManager {
    store: Arc<dyn RecordStore>,
    sync: Arc<IndexSynchronizer>,
    config: RegistrationConfig,
    retry: RetryPolicy,
}

impl RegistrationManager {
    /// Manager over `store`, notifying `sync` after each commit.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        sync: Arc<IndexSynchronizer>,
        config: RegistrationConfig,
    ) -> Self {
        let retry = RetryPolicy::builder()
            .max_retries(config.conflict_retries)
            .initial_delay(config.conflict_retry_delay())
            .build();
        Self {
            store,
            sync,
            config,
            retry,
        }
    }

    /// Take a seat at the conference for the caller.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unauthorized`] without an identity
    /// - [`ServiceError::NotFound`] for a malformed or unknown key
    /// - [`ServiceError::Conflict`] with `AlreadyRegistered` or
    ///   `NoSeatsAvailable`
    /// - [`ServiceError::Concurrency`] if contention outlasted the retries
    #[tracing::instrument(skip(self, identity), fields(operation = "register"))]
    pub async fn register(&self, identity: Option<&Identity>, conference_key: &str) -> Result<()> {
        self.run(Operation::Register, identity, conference_key).await
    }

    /// Give the caller's seat back.
    ///
    /// # Errors
    ///
    /// As [`RegistrationManager::register`], with `NotRegistered` as the
    /// business rejection.
    #[tracing::instrument(skip(self, identity), fields(operation = "cancel"))]
    pub async fn cancel(&self, identity: Option<&Identity>, conference_key: &str) -> Result<()> {
        self.run(Operation::Cancel, identity, conference_key).await
    }

    async fn run(
        &self,
        operation: Operation,
        identity: Option<&Identity>,
        conference_key: &str,
    ) -> Result<()> {
        let identity = require_identity(identity)?;
        let key = resolve_conference_key(conference_key)?;
        let started = Instant::now();

        let outcome = retry_if(
            &self.retry,
            || self.attempt(operation, identity, &key),
            |err: &ServiceError| {
                let retryable = err.is_retryable();
                if retryable {
                    RegistrationMetrics::record_conflict(operation.as_str());
                }
                retryable
            },
        )
        .await;

        let label = match &outcome {
            Ok(()) => "ok",
            Err(err) => err.kind().as_str(),
        };
        RegistrationMetrics::record(operation.as_str(), label, started.elapsed());

        match &outcome {
            Ok(()) => {
                tracing::info!(conference_key = %key, %operation, "Registration committed");
                self.sync.conference_changed(&key).await;
            }
            Err(err) => {
                tracing::debug!(conference_key = %key, %operation, error = %err, "Registration rejected");
            }
        }
        outcome
    }

    /// One transaction attempt.
    ///
    /// The configured timeout bounds the reads and the decision only; the
    /// commit runs under the store's own deadline.
    async fn attempt(&self, operation: Operation, identity: &Identity, key: &Key) -> Result<()> {
        let timeout = self.config.transaction_timeout();
        let tx = match tokio::time::timeout(timeout, self.prepare(operation, identity, key)).await
        {
            Ok(prepared) => prepared?,
            Err(_) => return Err(StoreError::Timeout(timeout).into()),
        };
        tx.commit().await?;
        Ok(())
    }

    /// Read both entities, apply the business rules and buffer the writes.
    async fn prepare(
        &self,
        operation: Operation,
        identity: &Identity,
        key: &Key,
    ) -> Result<Transaction<'_>> {
        let profile_key = identity.profile_key();
        let mut tx = Transaction::begin(self.store.as_ref(), TransactionOptions::cross_group());

        let (stored_profile, stored_conference) =
            futures::try_join!(tx.get(&profile_key), tx.get(key))?;

        let stored_conference = stored_conference
            .ok_or_else(|| ServiceError::NotFound(format!("no conference found with key: {key}")))?;
        let mut conference = conference_from_entity(key.clone(), &stored_conference)?;
        let mut profile = match stored_profile {
            Some(entity) => profile_from_entity(&identity.email, &entity)?,
            None => Profile::for_identity(identity),
        };

        match operation {
            Operation::Register => {
                if profile.is_registered(key) {
                    return Err(RegistrationConflict::AlreadyRegistered.into());
                }
                if conference.seats_available == 0 {
                    return Err(RegistrationConflict::NoSeatsAvailable.into());
                }
                profile.register(key.clone());
                conference.seats_available -= 1;
            }
            Operation::Cancel => {
                if !profile.unregister(key) {
                    return Err(RegistrationConflict::NotRegistered.into());
                }
                conference.seats_available = conference
                    .seats_available
                    .saturating_add(1)
                    .min(conference.max_attendees);
            }
        }

        tx.put(profile_key, profile_to_entity(&profile));
        tx.put(key.clone(), conference_to_entity(&conference));
        Ok(tx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_keys_are_not_found() {
        assert!(matches!(
            resolve_conference_key("%%%"),
            Err(ServiceError::NotFound(_))
        ));
        let profile = Key::named("Profile", "u").encode();
        assert!(matches!(
            resolve_conference_key(&profile),
            Err(ServiceError::NotFound(_))
        ));
        let conference = Key::with_id(CONFERENCE_KIND, 5);
        assert_eq!(
            resolve_conference_key(&conference.encode()).unwrap(),
            conference
        );
    }
}
