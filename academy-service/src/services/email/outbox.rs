//! Email outbox backed by `email_log`.
//!
//! Rows are enqueued as `pending` and sent by [`EmailOutbox::drain`]. A
//! failed send is retried with exponential backoff until `max_attempts`,
//! after which the row is marked `failed`.

use super::{EmailMessage, EmailProvider};
use crate::models::{EmailLog, EmailStatus};
use crate::services::metrics::record_email;
use crate::services::store::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub attempted: u64,
    pub sent: u64,
    pub retried: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct EmailOutbox {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmailProvider>,
    max_attempts: i32,
    backoff: RetryConfig,
}

impl EmailOutbox {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn EmailProvider>, max_attempts: i32) -> Self {
        Self {
            store,
            provider,
            max_attempts: max_attempts.max(1),
            backoff: RetryConfig {
                max_retries: max_attempts.max(1) as u32,
                initial_backoff: Duration::from_secs(60),
                max_backoff: Duration::from_secs(6 * 60 * 60),
                backoff_multiplier: 2.0,
                add_jitter: false,
            },
        }
    }

    /// Queue an email. Returns false when its dedupe key was already used.
    #[instrument(skip(self, email), fields(kind = %email.kind))]
    pub async fn enqueue(&self, email: &EmailLog) -> Result<bool, AppError> {
        let inserted = self.store.enqueue_email(email).await?;
        record_email(&email.kind, if inserted { "enqueued" } else { "duplicate" });
        Ok(inserted)
    }

    /// Send up to `limit` due emails.
    #[instrument(skip(self))]
    pub async fn drain(&self, limit: i64, now: DateTime<Utc>) -> Result<DrainSummary, AppError> {
        let due = self.store.due_emails(now, limit).await?;
        let mut summary = DrainSummary::default();

        for mut email in due {
            summary.attempted += 1;
            email.attempts += 1;

            let message = EmailMessage {
                to: email.recipient.clone(),
                subject: email.subject.clone(),
                body_text: email.body_text.clone(),
            };

            let outcome = match self.provider.send(&message).await {
                Ok(response) if response.success => Ok(response.provider_id),
                Ok(response) => Err(response
                    .message
                    .unwrap_or_else(|| "provider reported failure".to_string())),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(provider_id) => {
                    email.status = EmailStatus::Sent.as_str().to_string();
                    email.provider_message_id = provider_id;
                    email.sent_utc = Some(now);
                    email.last_error = None;
                    summary.sent += 1;
                    record_email(&email.kind, "sent");
                }
                Err(error) if email.attempts >= self.max_attempts => {
                    warn!(email_id = %email.email_id, attempts = email.attempts, error = %error, "Email permanently failed");
                    email.status = EmailStatus::Failed.as_str().to_string();
                    email.last_error = Some(error);
                    summary.failed += 1;
                    record_email(&email.kind, "failed");
                }
                Err(error) => {
                    let delay = self.backoff.backoff_duration((email.attempts - 1) as u32);
                    email.next_attempt_utc = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::hours(1));
                    warn!(
                        email_id = %email.email_id,
                        attempts = email.attempts,
                        retry_at = %email.next_attempt_utc,
                        error = %error,
                        "Email send failed, will retry"
                    );
                    email.last_error = Some(error);
                    summary.retried += 1;
                    record_email(&email.kind, "retry");
                }
            }

            self.store.update_email(&email).await?;
        }

        if summary.attempted > 0 {
            info!(
                sent = summary.sent,
                retried = summary.retried,
                failed = summary.failed,
                "Email outbox drained"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::MockEmailProvider;
    use crate::services::store::{EmailStore as _, MemoryStore};

    fn outbox(provider: Arc<MockEmailProvider>, max_attempts: i32) -> (EmailOutbox, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (EmailOutbox::new(store.clone(), provider, max_attempts), store)
    }

    fn email(now: DateTime<Utc>) -> EmailLog {
        EmailLog::pending(
            None,
            "parent@example.com",
            "Payment reminder",
            "Your charge is due",
            "reminder",
            None,
            now,
        )
    }

    #[tokio::test]
    async fn successful_send_marks_row_sent() {
        let provider = Arc::new(MockEmailProvider::new());
        let (outbox, store) = outbox(provider.clone(), 3);
        let now = Utc::now();
        outbox.enqueue(&email(now)).await.unwrap();

        let summary = outbox.drain(10, now).await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(provider.send_count(), 1);
        let rows = store.list_emails(None).await.unwrap();
        assert_eq!(rows[0].status, "sent");
        assert_eq!(rows[0].provider_message_id.as_deref(), Some("mock-email-1"));
    }

    #[tokio::test]
    async fn failures_back_off_then_give_up() {
        let provider = Arc::new(MockEmailProvider::new());
        provider.set_failing(true);
        let (outbox, store) = outbox(provider, 2);
        let now = Utc::now();
        outbox.enqueue(&email(now)).await.unwrap();

        let first = outbox.drain(10, now).await.unwrap();
        assert_eq!(first.retried, 1);
        let row = store.list_emails(None).await.unwrap().remove(0);
        assert_eq!(row.status, "pending");
        assert!(row.next_attempt_utc > now);

        // Not due yet.
        assert_eq!(outbox.drain(10, now).await.unwrap().attempted, 0);

        let later = row.next_attempt_utc;
        let second = outbox.drain(10, later).await.unwrap();
        assert_eq!(second.failed, 1);
        let row = store.list_emails(None).await.unwrap().remove(0);
        assert_eq!(row.status, "failed");
        assert_eq!(row.attempts, 2);
        assert!(row.last_error.is_some());
    }
}
