//! Class schedule and attendance.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Class {
    pub class_id: Uuid,
    pub academy_id: Uuid,
    pub group_id: Option<Uuid>,
    pub name: String,
    /// 0 = Monday .. 6 = Sunday.
    pub weekday: i16,
    /// `HH:MM`, 24h.
    pub start_time: String,
    pub duration_minutes: i32,
    pub coach_name: Option<String>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

/// Attendance of one athlete at one class session. Re-recording replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub attendance_id: Uuid,
    pub class_id: Uuid,
    pub athlete_id: Uuid,
    pub session_date: NaiveDate,
    pub status: String,
    pub recorded_utc: DateTime<Utc>,
}
