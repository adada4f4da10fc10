//! Training groups and memberships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub group_id: Uuid,
    pub academy_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub monthly_fee_cents: Option<i64>,
    pub billing_item_id: Option<Uuid>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub athlete_id: Uuid,
    pub custom_fee_cents: Option<i64>,
    pub is_active: bool,
    pub joined_utc: DateTime<Utc>,
}

/// One row considered by the monthly charge generator: an active membership
/// of an active athlete in an active group, with the group's linked item.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationCandidate {
    pub athlete_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub group_id: Uuid,
    pub group_name: String,
    pub custom_fee_cents: Option<i64>,
    pub group_fee_cents: Option<i64>,
    pub billing_item_id: Option<Uuid>,
    pub item_amount_cents: Option<i64>,
    pub item_currency: Option<String>,
    pub item_is_active: Option<bool>,
}
