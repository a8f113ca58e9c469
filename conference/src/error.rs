//! Error taxonomy surfaced to callers.
//!
//! Every collaborator error is folded into [`ServiceError`] at the service
//! boundary. The split that matters to callers:
//!
//! - [`ServiceError::Conflict`] is a business-rule rejection; retrying will
//!   not help unless the underlying state changes
//! - [`ServiceError::Concurrency`] is write contention; the operation left no
//!   trace and is safe to retry

use crate::query::FilterError;
use conference_central_core::KeyError;
use conference_central_core::cache::CacheError;
use conference_central_core::entity::EntityError;
use conference_central_core::search::SearchError;
use conference_central_core::store::StoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Business-rule rejections of register and cancel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationConflict {
    /// The profile already holds a seat at the conference.
    #[error("already registered")]
    AlreadyRegistered,
    /// The profile holds no seat at the conference.
    #[error("not registered")]
    NotRegistered,
    /// The conference has no seats left.
    #[error("no seats available")]
    NoSeatsAvailable,
}

/// Coarse error class, stable for metrics labels and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No identified caller.
    Unauthorized,
    /// Malformed input; nothing was touched.
    Validation,
    /// A key did not resolve.
    NotFound,
    /// A business rule rejected the operation.
    Conflict,
    /// Transient write contention.
    Concurrency,
    /// A collaborator failed.
    Internal,
}

impl ErrorKind {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Concurrency => "concurrency",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by every public service operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The operation needs an identified caller.
    #[error("authorization required")]
    Unauthorized,

    /// The request is malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A registration business rule rejected the operation.
    #[error(transparent)]
    Conflict(RegistrationConflict),

    /// The transaction lost a write race or timed out; safe to retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// A collaborator failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Concurrency(_) => ErrorKind::Concurrency,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

impl From<RegistrationConflict> for ServiceError {
    fn from(conflict: RegistrationConflict) -> Self {
        Self::Conflict(conflict)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            Self::Concurrency(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<FilterError> for ServiceError {
    fn from(err: FilterError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<KeyError> for ServiceError {
    fn from(err: KeyError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<EntityError> for ServiceError {
    fn from(err: EntityError) -> Self {
        Self::Internal(format!("corrupt record: {err}"))
    }
}

impl From<SearchError> for ServiceError {
    fn from(err: SearchError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result alias for service operations.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use conference_central_core::Key;
    use std::time::Duration;

    #[test]
    fn test_store_errors_split_by_retryability() {
        let conflict: ServiceError = StoreError::Conflict {
            key: Key::named("Profile", "a"),
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::Concurrency);
        assert!(conflict.is_retryable());

        let timeout: ServiceError = StoreError::Timeout(Duration::from_secs(1)).into();
        assert!(timeout.is_retryable());

        let down: ServiceError = StoreError::Unavailable("down".into()).into();
        assert_eq!(down.kind(), ErrorKind::Internal);
        assert!(!down.is_retryable());
    }

    #[test]
    fn test_business_conflicts_are_not_retryable() {
        let err = ServiceError::from(RegistrationConflict::NoSeatsAvailable);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "no seats available");
    }
}
