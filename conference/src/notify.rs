//! Creation confirmations.

use crate::types::Conference;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::info;

/// Subject line of the creation confirmation.
pub const CONFIRMATION_SUBJECT: &str = "You created a new Conference!";

/// Notification delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The message could not be handed off.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Boxed future returned by [`Notifier`] methods.
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Outbound message delivery.
pub trait Notifier: Send + Sync {
    /// Send a plain-text message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] if the message was not accepted.
    fn send<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> NotifyFuture<'a>;
}

/// Body of the creation confirmation.
#[must_use]
pub fn confirmation_body(conference: &Conference) -> String {
    format!(
        "Hi, you have created the following conference:\n{}",
        conference.summary()
    )
}

/// Notifier that writes messages to the log and stdout.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Create a new log notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn send<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            info!(to = %to, subject = %subject, "Confirmation message (log only)");
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║ To: {to:<57}║");
            println!("║ Subject: {subject:<52}║");
            println!("╠══════════════════════════════════════════════════════════════╣");
            for line in body.lines() {
                println!("║ {line:<61}║");
            }
            println!("╚══════════════════════════════════════════════════════════════╝\n");
            Ok(())
        })
    }
}
