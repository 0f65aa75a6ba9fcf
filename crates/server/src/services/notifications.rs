//! Bounded queue between request handlers and the mailer.
//!
//! Handlers never wait on SMTP. They push a composed [`OutgoingEmail`] into a
//! bounded channel, waiting at most the enqueue timeout for room, and one
//! worker task drains the channel with a per-send timeout.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::NotificationConfig;

use super::email::{EmailError, Mailer, OutgoingEmail};

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The worker has stopped.
    #[error("notification queue closed")]
    QueueClosed,
    /// No room freed up within the enqueue timeout.
    #[error("notification queue full")]
    QueueFull,
    #[error("failed to compose email: {0}")]
    Compose(#[from] EmailError),
}

/// Sender half of the notification queue. Cheap to clone.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<OutgoingEmail>,
    enqueue_timeout: Duration,
}

impl NotificationQueue {
    /// Start the worker and return the queue feeding it.
    ///
    /// The worker exits once every `NotificationQueue` clone is dropped and
    /// the backlog is sent; await the handle to drain on shutdown.
    #[must_use]
    pub fn spawn(mailer: Arc<dyn Mailer>, config: NotificationConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, mailer, config.send_timeout));
        (
            Self {
                tx,
                enqueue_timeout: config.enqueue_timeout,
            },
            handle,
        )
    }

    /// Queue an email for delivery.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::QueueFull` if no capacity frees up in time and
    /// `NotifyError::QueueClosed` if the worker is gone.
    pub async fn enqueue(&self, email: OutgoingEmail) -> Result<(), NotifyError> {
        self.tx
            .send_timeout(email, self.enqueue_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => NotifyError::QueueFull,
                SendTimeoutError::Closed(_) => NotifyError::QueueClosed,
            })
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<OutgoingEmail>,
    mailer: Arc<dyn Mailer>,
    send_timeout: Duration,
) {
    info!("Notification worker started");
    while let Some(email) = rx.recv().await {
        match tokio::time::timeout(send_timeout, mailer.send(&email)).await {
            Ok(Ok(())) => {
                info!(to = %email.to_address, subject = %email.subject, "Email sent");
            }
            Ok(Err(e)) => {
                error!(
                    to = %email.to_address,
                    subject = %email.subject,
                    error = %e,
                    "Email delivery failed"
                );
            }
            Err(_) => {
                warn!(
                    to = %email.to_address,
                    subject = %email.subject,
                    timeout_secs = send_timeout.as_secs(),
                    "Email delivery timed out"
                );
            }
        }
    }
    info!("Notification worker stopped");
}
