//! # Conference Central
//!
//! Conference registration with bounded capacity, under concurrent writers,
//! with a search projection and a listing cache kept eventually consistent
//! with the authoritative records.
//!
//! ## Components
//!
//! - [`registration`]: register/cancel as one cross-group optimistic
//!   transaction over the profile and the conference
//! - [`query`]: filter parsing and compilation under the
//!   single-inequality-field rule
//! - [`sync`]: search document refresh (inline or queued), listing cache
//!   invalidation, and the reconciliation sweep
//! - [`api::ConferenceApi`]: the nine public operations wired over the
//!   collaborator traits from `conference-central-core`
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use conference_central::{Config, ConferenceApi, ConferenceForm, Identity, LogNotifier};
//! use conference_central_testing::{InMemoryCache, InMemoryRecordStore, InMemorySearchEngine};
//!
//! # tokio_test::block_on(async {
//! let api = ConferenceApi::new(
//!     &Config::for_tests(),
//!     Arc::new(InMemoryRecordStore::new()),
//!     &InMemorySearchEngine::new(),
//!     Arc::new(InMemoryCache::new()),
//!     Arc::new(LogNotifier::new()),
//! )
//! .unwrap();
//!
//! let ada = Identity::new("ada", "ada@example.com");
//! let form = ConferenceForm {
//!     name: "dotGo".into(),
//!     max_attendees: Some(1.into()),
//!     ..ConferenceForm::default()
//! };
//! let conference = api.create_conference(Some(&ada), &form).await.unwrap();
//! api.register(Some(&ada), &conference.key.encode()).await.unwrap();
//!
//! let conference = api.get_conference(&conference.key.encode()).await.unwrap();
//! assert_eq!(conference.seats_available, 0);
//! # });
//! ```

/// Service facade
pub mod api;

/// Conference creation, lookup and queries
pub mod conference;

/// Environment configuration
pub mod config;

/// Search projection
pub mod document;

/// Error taxonomy
pub mod error;

/// Creation confirmations
pub mod notify;

/// Profile reads and edits
pub mod profile;

pub mod query;

/// Registration transactions
pub mod registration;

/// Field mapping table and entity conversions
pub mod schema;

pub mod sync;

/// Tracing setup
pub mod telemetry;

/// Domain types
pub mod types;

pub use api::ConferenceApi;
pub use config::Config;
pub use error::{ErrorKind, RegistrationConflict, Result, ServiceError};
pub use notify::{LogNotifier, Notifier};
pub use query::{ConferenceQueryForm, FilterForm};
pub use sync::ReconcileReport;
pub use types::{Conference, ConferenceForm, Identity, Profile, ProfileForm, TeeShirtSize};
