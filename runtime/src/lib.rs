//! # Conference Central Runtime
//!
//! Execution support shared by the Conference Central services.
//!
//! ## Core Components
//!
//! - **Retry** ([`retry`]): exponential backoff with jitter, used to retry
//!   registration transactions that lost an optimistic-concurrency race
//! - **Task queue** ([`tasks`]): an at-least-once background queue that
//!   decouples search reindexing from the request path
//! - **Metrics** ([`metrics`]): metric descriptions, recorders and the
//!   Prometheus exporter
//!
//! Nothing here knows about conferences; the service crate supplies the task
//! handlers and decides what is retryable.

/// Retry logic with exponential backoff
pub mod retry;

/// At-least-once background task queue
pub mod tasks;

/// Prometheus metrics for observability
pub mod metrics;

pub use retry::RetryPolicy;
pub use tasks::{TaskError, TaskHandler, TaskQueue, TaskQueueConfig, TaskSender};
