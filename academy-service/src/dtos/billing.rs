use crate::models::{ChargeStatus, Periodicity};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct IncludeInactiveParams {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBillingItemRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Amount cannot be negative"))]
    pub amount_cents: i64,
    /// Academy currency when omitted.
    pub currency: Option<String>,
    pub periodicity: Option<Periodicity>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBillingItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Amount cannot be negative"))]
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub periodicity: Option<Periodicity>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChargeListParams {
    pub period: Option<String>,
    pub status: Option<ChargeStatus>,
    pub athlete_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChargeRequest {
    pub athlete_id: Uuid,
    pub group_id: Option<Uuid>,
    pub billing_item_id: Option<Uuid>,
    /// `YYYY-MM`; the month of `due_date` when omitted.
    pub period: Option<String>,
    #[validate(length(max = 300))]
    pub description: Option<String>,
    /// Taken from the billing item when omitted.
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChargeRequest {
    pub status: Option<ChargeStatus>,
    #[validate(range(min = 0))]
    pub amount_paid_cents: Option<i64>,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 300))]
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayChargeRequest {
    #[validate(length(min = 1, max = 50, message = "Payment method is required"))]
    pub payment_method: String,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateChargesRequest {
    #[validate(length(equal = 7, message = "Period must be YYYY-MM"))]
    pub period: String,
    pub group_id: Option<Uuid>,
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,
    #[validate(range(min = 1, max = 28, message = "Due day must be between 1 and 28"))]
    pub due_day: Option<u32>,
    /// Fallback fee for memberships with no other price.
    pub billing_item_id: Option<Uuid>,
}

fn default_skip_duplicates() -> bool {
    true
}
