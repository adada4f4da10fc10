//! Athlete and guardian models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Athlete status. Deleting an athlete marks it inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AthleteStatus {
    Active,
    Inactive,
}

impl AthleteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AthleteStatus::Active => "active",
            AthleteStatus::Inactive => "inactive",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "inactive" => AthleteStatus::Inactive,
            _ => AthleteStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Athlete {
    pub athlete_id: Uuid,
    pub academy_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub level: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Athlete {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        AthleteStatus::from_string(&self.status) == AthleteStatus::Active
    }
}

/// Filter parameters for listing athletes.
#[derive(Debug, Clone, Default)]
pub struct ListAthletesFilter {
    pub status: Option<AthleteStatus>,
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Parent or contact linked to one or more athletes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Guardian {
    pub guardian_id: Uuid,
    pub academy_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub relationship: Option<String>,
    pub created_utc: DateTime<Utc>,
}
