//! Configuration management.
//!
//! Every setting has a default and can be overridden by an environment
//! variable. The binary loads a `.env` file first (see
//! [`Config::from_env`]); tests use [`Config::for_tests`].
//!
//! | Variable | Default |
//! |---|---|
//! | `CC_CONFLICT_RETRIES` | `1` |
//! | `CC_CONFLICT_RETRY_DELAY_MS` | `20` |
//! | `CC_TRANSACTION_TIMEOUT_MS` | `5000` |
//! | `CC_INDEXING_MODE` (`inline`, `deferred`) | `deferred` |
//! | `CC_LISTING_CACHE_TTL_SECS` | `600` |
//! | `CC_TASK_QUEUE_CAPACITY` | `1024` |
//! | `CC_TASK_MAX_ATTEMPTS` | `5` |
//! | `CC_TASK_RETRY_DELAY_MS` | `100` |
//! | `CC_RECONCILE_INTERVAL_SECS` | unset (no periodic sweep) |
//! | `CC_SEARCH_INDEX` | `Conference` |
//! | `CC_QUERY_BACKEND` (`search`, `store`) | `search` |
//! | `CC_LOG_LEVEL` | `info` |
//! | `CC_METRICS_ADDR` | unset (no exporter) |

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds an unparsable value.
    #[error("invalid value {value:?} for {name}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// When search documents are refreshed after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingMode {
    /// In the request path, before the operation returns.
    Inline,
    /// On the background task queue.
    Deferred,
}

impl FromStr for IndexingMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "deferred" | "async" => Ok(Self::Deferred),
            _ => Err(()),
        }
    }
}

impl fmt::Display for IndexingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Deferred => f.write_str("deferred"),
        }
    }
}

/// Where filtered conference queries run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBackend {
    /// The full-text search index.
    Search,
    /// An ordered record store query.
    Store,
}

impl FromStr for QueryBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "store" | "datastore" => Ok(Self::Store),
            _ => Err(()),
        }
    }
}

/// Registration transaction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// Retries after a transaction conflict.
    pub conflict_retries: usize,
    /// Initial backoff between conflict retries, in milliseconds.
    pub conflict_retry_delay_ms: u64,
    /// Deadline for the reads and decision of one attempt, in milliseconds.
    /// The commit runs under the store's own deadline.
    pub transaction_timeout_ms: u64,
}

impl RegistrationConfig {
    /// Initial conflict backoff.
    #[must_use]
    pub const fn conflict_retry_delay(&self) -> Duration {
        Duration::from_millis(self.conflict_retry_delay_ms)
    }

    /// Deadline for one transaction attempt.
    #[must_use]
    pub const fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 1,
            conflict_retry_delay_ms: 20,
            transaction_timeout_ms: 5_000,
        }
    }
}

/// Search index and cache synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// When documents are refreshed.
    pub mode: IndexingMode,
    /// Name of the conference search index.
    pub index_name: String,
    /// Time-to-live of the unfiltered listing cache entry, in seconds.
    pub listing_cache_ttl_secs: u64,
    /// Reindex tasks buffered before submissions are dropped.
    pub queue_capacity: usize,
    /// Deliveries per reindex task.
    pub task_max_attempts: usize,
    /// Initial backoff between deliveries, in milliseconds.
    pub task_retry_delay_ms: u64,
    /// Period of the background reconciliation sweep, in seconds.
    pub reconcile_interval_secs: Option<u64>,
}

impl SyncConfig {
    /// Listing cache time-to-live.
    #[must_use]
    pub const fn listing_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_cache_ttl_secs)
    }

    /// Initial backoff between reindex deliveries.
    #[must_use]
    pub const fn task_retry_delay(&self) -> Duration {
        Duration::from_millis(self.task_retry_delay_ms)
    }

    /// Reconciliation period, if enabled.
    #[must_use]
    pub fn reconcile_interval(&self) -> Option<Duration> {
        self.reconcile_interval_secs.map(Duration::from_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: IndexingMode::Deferred,
            index_name: "Conference".to_string(),
            listing_cache_ttl_secs: 600,
            queue_capacity: 1024,
            task_max_attempts: 5,
            task_retry_delay_ms: 100,
            reconcile_interval_secs: None,
        }
    }
}

/// Query settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Backend for filtered queries.
    pub filtered_backend: QueryBackend,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            filtered_backend: QueryBackend::Search,
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Prometheus listener address.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_addr: None,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Registration transactions.
    pub registration: RegistrationConfig,
    /// Index and cache synchronization.
    pub sync: SyncConfig,
    /// Query execution.
    pub query: QueryConfig,
    /// Logging and metrics.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from environment variables over the defaults.
    ///
    /// Does not read `.env`; binaries call `dotenvy::dotenv()` first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is unparsable or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            registration: RegistrationConfig {
                conflict_retries: var_or(
                    "CC_CONFLICT_RETRIES",
                    defaults.registration.conflict_retries,
                )?,
                conflict_retry_delay_ms: var_or(
                    "CC_CONFLICT_RETRY_DELAY_MS",
                    defaults.registration.conflict_retry_delay_ms,
                )?,
                transaction_timeout_ms: var_or(
                    "CC_TRANSACTION_TIMEOUT_MS",
                    defaults.registration.transaction_timeout_ms,
                )?,
            },
            sync: SyncConfig {
                mode: var_or("CC_INDEXING_MODE", defaults.sync.mode)?,
                index_name: var_or("CC_SEARCH_INDEX", defaults.sync.index_name)?,
                listing_cache_ttl_secs: var_or(
                    "CC_LISTING_CACHE_TTL_SECS",
                    defaults.sync.listing_cache_ttl_secs,
                )?,
                queue_capacity: var_or("CC_TASK_QUEUE_CAPACITY", defaults.sync.queue_capacity)?,
                task_max_attempts: var_or(
                    "CC_TASK_MAX_ATTEMPTS",
                    defaults.sync.task_max_attempts,
                )?,
                task_retry_delay_ms: var_or(
                    "CC_TASK_RETRY_DELAY_MS",
                    defaults.sync.task_retry_delay_ms,
                )?,
                reconcile_interval_secs: var_opt("CC_RECONCILE_INTERVAL_SECS")?,
            },
            query: QueryConfig {
                filtered_backend: var_or("CC_QUERY_BACKEND", defaults.query.filtered_backend)?,
            },
            telemetry: TelemetryConfig {
                log_level: var_or("CC_LOG_LEVEL", defaults.telemetry.log_level)?,
                metrics_addr: var_opt("CC_METRICS_ADDR")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Deterministic settings for tests: inline indexing, fast retries.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            registration: RegistrationConfig {
                conflict_retries: 1,
                conflict_retry_delay_ms: 1,
                transaction_timeout_ms: 2_000,
            },
            sync: SyncConfig {
                mode: IndexingMode::Inline,
                task_retry_delay_ms: 1,
                ..SyncConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registration.transaction_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "transaction timeout must be > 0".to_string(),
            ));
        }
        if self.sync.index_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "search index name cannot be empty".to_string(),
            ));
        }
        if self.sync.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "task queue capacity must be > 0".to_string(),
            ));
        }
        if self.sync.task_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "task max attempts must be > 0".to_string(),
            ));
        }
        if self.sync.reconcile_interval_secs == Some(0) {
            return Err(ConfigError::Validation(
                "reconcile interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn var_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(var_opt(name)?.unwrap_or(default))
}

fn var_opt<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::for_tests().validate().is_ok());
        assert_eq!(Config::for_tests().sync.mode, IndexingMode::Inline);
        assert_eq!(
            Config::default().sync.listing_cache_ttl(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_mode_and_backend_parsing() {
        assert_eq!("Deferred".parse(), Ok(IndexingMode::Deferred));
        assert_eq!(" inline ".parse(), Ok(IndexingMode::Inline));
        assert!("eventually".parse::<IndexingMode>().is_err());
        assert_eq!("STORE".parse(), Ok(QueryBackend::Store));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = Config::for_tests();
        config.sync.task_max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }
}
