//! Email outbox rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Pending => "pending",
            EmailStatus::Sent => "sent",
            EmailStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailLog {
    pub email_id: Uuid,
    pub academy_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub body_text: String,
    pub kind: String,
    pub dedupe_key: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub next_attempt_utc: DateTime<Utc>,
    pub sent_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl EmailLog {
    /// A fresh pending outbox row, due immediately.
    pub fn pending(
        academy_id: Option<Uuid>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body_text: impl Into<String>,
        kind: impl Into<String>,
        dedupe_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            email_id: Uuid::new_v4(),
            academy_id,
            recipient: recipient.into(),
            subject: subject.into(),
            body_text: body_text.into(),
            kind: kind.into(),
            dedupe_key,
            status: EmailStatus::Pending.as_str().to_string(),
            attempts: 0,
            last_error: None,
            provider_message_id: None,
            next_attempt_utc: now,
            sent_utc: None,
            created_utc: now,
        }
    }
}
