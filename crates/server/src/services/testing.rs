//! Mailers for tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::email::{EmailError, Mailer, OutgoingEmail};

/// Keeps every email it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    notify: Notify,
}

impl RecordingMailer {
    /// Emails sent so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` emails were sent or `timeout` passes, then
    /// return what was sent.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutgoingEmail> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.sent();
            }
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        self.notify.notify_one();
        Ok(())
    }
}

/// Rejects every email.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        Err(EmailError::InvalidAddress(email.to_address.clone()))
    }
}
