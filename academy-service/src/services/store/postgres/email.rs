use super::PgStore;
use crate::models::{EmailLog, EmailStatus};
use crate::services::metrics::db_timer;
use crate::services::store::EmailStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use tracing::{debug, instrument};
use uuid::Uuid;

const EMAIL_COLUMNS: &str = "email_id, academy_id, recipient, subject, body_text, kind, dedupe_key, \
     status, attempts, last_error, provider_message_id, next_attempt_utc, sent_utc, created_utc";

#[async_trait]
impl EmailStore for PgStore {
    #[instrument(skip(self, email), fields(kind = %email.kind))]
    async fn enqueue_email(&self, email: &EmailLog) -> Result<bool, AppError> {
        let _timer = db_timer("enqueue_email");

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO email_log ({EMAIL_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#
        ))
        .bind(email.email_id)
        .bind(email.academy_id)
        .bind(&email.recipient)
        .bind(&email.subject)
        .bind(&email.body_text)
        .bind(&email.kind)
        .bind(&email.dedupe_key)
        .bind(&email.status)
        .bind(email.attempts)
        .bind(&email.last_error)
        .bind(&email.provider_message_id)
        .bind(email.next_attempt_utc)
        .bind(email.sent_utc)
        .bind(email.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to enqueue email", e))?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(dedupe_key = ?email.dedupe_key, "Email already queued");
        }
        Ok(inserted)
    }

    async fn due_emails(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<EmailLog>, AppError> {
        let pool = &self.pool;
        self.read("due_emails", move || async move {
            sqlx::query_as::<_, EmailLog>(&format!(
                r#"
                SELECT {EMAIL_COLUMNS} FROM email_log
                WHERE status = $1 AND next_attempt_utc <= $2
                ORDER BY next_attempt_utc
                LIMIT $3
                "#
            ))
            .bind(EmailStatus::Pending.as_str())
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to load due emails", e))
        })
        .await
    }

    #[instrument(skip(self, email), fields(email_id = %email.email_id, status = %email.status))]
    async fn update_email(&self, email: &EmailLog) -> Result<EmailLog, AppError> {
        let _timer = db_timer("update_email");

        sqlx::query_as::<_, EmailLog>(&format!(
            r#"
            UPDATE email_log
            SET status = $2, attempts = $3, last_error = $4, provider_message_id = $5,
                next_attempt_utc = $6, sent_utc = $7
            WHERE email_id = $1
            RETURNING {EMAIL_COLUMNS}
            "#
        ))
        .bind(email.email_id)
        .bind(&email.status)
        .bind(email.attempts)
        .bind(&email.last_error)
        .bind(&email.provider_message_id)
        .bind(email.next_attempt_utc)
        .bind(email.sent_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update email", e))
    }

    async fn list_emails(&self, academy_id: Option<Uuid>) -> Result<Vec<EmailLog>, AppError> {
        let pool = &self.pool;
        self.read("list_emails", move || async move {
            sqlx::query_as::<_, EmailLog>(&format!(
                r#"
                SELECT {EMAIL_COLUMNS} FROM email_log
                WHERE ($1::uuid IS NULL OR academy_id = $1)
                ORDER BY created_utc DESC
                "#
            ))
            .bind(academy_id)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list emails", e))
        })
        .await
    }
}
