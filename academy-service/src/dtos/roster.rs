use crate::models::{AthleteStatus, AttendanceStatus};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AthleteListParams {
    pub status: Option<AthleteStatus>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAthleteRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub level: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAthleteRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub level: Option<String>,
    pub status: Option<AthleteStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGuardianRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 50))]
    pub relationship: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGuardianRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 50))]
    pub relationship: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkGuardianRequest {
    pub guardian_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Fee cannot be negative"))]
    pub monthly_fee_cents: Option<i64>,
    pub billing_item_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Fee cannot be negative"))]
    pub monthly_fee_cents: Option<i64>,
    pub billing_item_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MembershipRequest {
    pub athlete_id: Uuid,
    #[validate(range(min = 0, message = "Fee cannot be negative"))]
    pub custom_fee_cents: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMembershipRequest {
    #[validate(range(min = 0, message = "Fee cannot be negative"))]
    pub custom_fee_cents: Option<i64>,
    /// Drop the override and fall back to the group fee.
    #[serde(default)]
    pub clear_custom_fee: bool,
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    pub group_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(range(min = 0, max = 6, message = "Weekday is 0 (Monday) to 6 (Sunday)"))]
    pub weekday: i16,
    /// `HH:MM`
    pub start_time: String,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    pub coach_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClassRequest {
    pub group_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 6, message = "Weekday is 0 (Monday) to 6 (Sunday)"))]
    pub weekday: Option<i16>,
    pub start_time: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i32>,
    pub coach_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub athlete_id: Uuid,
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceParams {
    pub date: Option<NaiveDate>,
}
