//! At-least-once background task queue.
//!
//! Work that must not delay the caller (reindexing after a registration) is
//! submitted to a [`TaskQueue`]. A single worker drains the queue and hands
//! each task to a [`TaskHandler`]. A failing task is retried with backoff up
//! to `max_attempts` times, so handlers must be idempotent: the same task can
//! be delivered more than once.
//!
//! # Example
//!
//! ```rust
//! use conference_central_runtime::tasks::{TaskError, TaskFuture, TaskHandler, TaskQueue, TaskQueueConfig};
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! impl TaskHandler<String> for Print {
//!     fn handle<'a>(&'a self, task: &'a String) -> TaskFuture<'a> {
//!         Box::pin(async move {
//!             println!("{task}");
//!             Ok(())
//!         })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), TaskError> {
//! let queue = TaskQueue::spawn("print", TaskQueueConfig::default(), Arc::new(Print));
//! queue.sender().submit("hello".to_string())?;
//! queue.wait_idle().await;
//! queue.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::metrics::TaskMetrics;
use crate::retry::{RetryPolicy, retry_with_backoff};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// Boxed future returned by [`TaskHandler::handle`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'a>>;

/// Errors from task submission and handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The handler failed; the task may be retried.
    #[error("task failed: {0}")]
    Failed(String),

    /// The queue is at capacity.
    #[error("task queue {0} is full")]
    QueueFull(&'static str),

    /// The queue has shut down.
    #[error("task queue {0} is closed")]
    Closed(&'static str),
}

/// Processes tasks of type `T`.
pub trait TaskHandler<T>: Send + Sync {
    /// Handle one delivery of `task`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Failed`] to request redelivery.
    fn handle<'a>(&'a self, task: &'a T) -> TaskFuture<'a>;
}

/// Queue sizing and redelivery settings.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// Buffered tasks before submissions are rejected.
    pub capacity: usize,
    /// Deliveries per task, including the first.
    pub max_attempts: usize,
    /// Backoff between deliveries.
    pub retry: RetryPolicy,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_attempts: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Cloneable handle for submitting tasks.
pub struct TaskSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    pending: Arc<watch::Sender<usize>>,
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> fmt::Debug for TaskSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSender")
            .field("name", &self.name)
            .field("pending", &*self.pending.borrow())
            .finish()
    }
}

impl<T> TaskSender<T> {
    /// Enqueue a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::QueueFull`] when the buffer is full and
    /// [`TaskError::Closed`] after shutdown.
    pub fn submit(&self, task: T) -> Result<(), TaskError> {
        self.pending.send_modify(|n| *n += 1);
        match self.tx.try_send(task) {
            Ok(()) => {
                TaskMetrics::record_submitted(self.name);
                Ok(())
            }
            Err(err) => {
                self.pending.send_modify(|n| *n = n.saturating_sub(1));
                TaskMetrics::record_rejected(self.name);
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => TaskError::QueueFull(self.name),
                    mpsc::error::TrySendError::Closed(_) => TaskError::Closed(self.name),
                })
            }
        }
    }
}

/// A running queue: one worker plus the handle to feed it.
pub struct TaskQueue<T> {
    name: &'static str,
    sender: TaskSender<T>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> TaskQueue<T>
where
    T: fmt::Debug + Send + Sync + 'static,
{
    /// Start the worker on the current Tokio runtime.
    #[must_use]
    pub fn spawn(
        name: &'static str,
        config: TaskQueueConfig,
        handler: Arc<dyn TaskHandler<T>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let (pending, _) = watch::channel(0_usize);
        let pending = Arc::new(pending);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            name,
            config,
            handler,
            pending: Arc::clone(&pending),
        };
        let handle = tokio::spawn(worker.run(rx, shutdown_rx));
        tracing::debug!(queue = name, "Task queue started");

        Self {
            name,
            sender: TaskSender { name, tx, pending },
            shutdown,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// A submission handle.
    #[must_use]
    pub fn sender(&self) -> TaskSender<T> {
        self.sender.clone()
    }

    /// Tasks submitted but not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.sender.pending.borrow()
    }

    /// Wait until every submitted task has finished, successfully or not.
    pub async fn wait_idle(&self) {
        let mut rx = self.sender.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting tasks, drain what is buffered, and wait for the worker.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(queue = self.name, error = %err, "Task worker panicked");
            }
        }
        tracing::debug!(queue = self.name, "Task queue stopped");
    }
}

struct Worker<T> {
    name: &'static str,
    config: TaskQueueConfig,
    handler: Arc<dyn TaskHandler<T>>,
    pending: Arc<watch::Sender<usize>>,
}

impl<T: fmt::Debug + Send + Sync + 'static> Worker<T> {
    async fn run(self, mut rx: mpsc::Receiver<T>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                task = rx.recv() => match task {
                    Some(task) => self.process(task).await,
                    None => return,
                },
            }
        }

        rx.close();
        while let Some(task) = rx.recv().await {
            self.process(task).await;
        }
    }

    async fn process(&self, task: T) {
        let policy = RetryPolicy {
            max_retries: self.config.max_attempts.saturating_sub(1),
            ..self.config.retry.clone()
        };
        let handler = self.handler.as_ref();
        let task_ref = &task;

        if let Err(err) = retry_with_backoff(&policy, move || handler.handle(task_ref)).await {
            TaskMetrics::record_failed(self.name);
            tracing::error!(
                queue = self.name,
                task = ?task,
                attempts = self.config.max_attempts,
                error = %err,
                "Task abandoned after final attempt"
            );
        }
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures_before_success: usize,
        calls: AtomicUsize,
        done: AtomicUsize,
    }

    impl TaskHandler<u32> for Flaky {
        fn handle<'a>(&'a self, _task: &'a u32) -> TaskFuture<'a> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if call < self.failures_before_success {
                    return Err(TaskError::Failed(format!("call {call}")));
                }
                self.done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn flaky(failures: usize) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures_before_success: failures,
            calls: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        })
    }

    fn config(max_attempts: usize) -> TaskQueueConfig {
        TaskQueueConfig {
            capacity: 8,
            max_attempts,
            retry: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(1))
                .jitter(false)
                .build(),
        }
    }

    #[tokio::test]
    async fn test_failed_task_is_redelivered() {
        let handler = flaky(2);
        let queue = TaskQueue::spawn("test", config(3), handler.clone());

        queue.sender().submit(1).unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handler.done.load(Ordering::SeqCst), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_task_abandoned_after_max_attempts() {
        let handler = flaky(usize::MAX);
        let queue = TaskQueue::spawn("test", config(2), handler.clone());

        queue.sender().submit(1).unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending(), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let handler = flaky(0);
        let queue = TaskQueue::spawn("test", config(1), handler.clone());
        let sender = queue.sender();

        for i in 0..5 {
            sender.submit(i).unwrap();
        }
        queue.shutdown().await;

        assert_eq!(handler.done.load(Ordering::SeqCst), 5);
        assert_eq!(sender.submit(9), Err(TaskError::Closed("test")));
        assert_eq!(queue.pending(), 0);
    }
}
