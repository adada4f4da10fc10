//! Owner subscription, mirrored processor invoices and in-app notifications.

use super::PlanCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Map a payment processor subscription status onto ours.
    pub fn from_processor(s: &str) -> Self {
        match s {
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" | "incomplete_expired" => SubscriptionStatus::Cancelled,
            "incomplete" => SubscriptionStatus::Incomplete,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// One subscription per owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub owner_id: Uuid,
    pub plan_code: String,
    pub status: String,
    pub processor_customer_id: Option<String>,
    pub processor_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    /// The implicit subscription of an owner who never subscribed.
    pub fn implicit_free(owner_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            subscription_id: Uuid::new_v4(),
            owner_id,
            plan_code: PlanCode::Free.as_str().to_string(),
            status: SubscriptionStatus::Active.as_str().to_string(),
            processor_customer_id: None,
            processor_subscription_id: None,
            current_period_end: None,
            cancel_at_period_end: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn plan(&self) -> PlanCode {
        PlanCode::from_string(&self.plan_code)
    }
}

/// Invoice history mirrored from payment processor webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessorInvoice {
    pub invoice_id: Uuid,
    pub owner_id: Uuid,
    pub processor_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// In-app notice for an owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub notification_id: Uuid,
    pub owner_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
    pub read_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}
