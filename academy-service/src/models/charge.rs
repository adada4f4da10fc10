//! Charge model and its status state machine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Charge status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
    Partial,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Overdue => "overdue",
            ChargeStatus::Cancelled => "cancelled",
            ChargeStatus::Partial => "partial",
        }
    }

    /// Whether a charge in this status may move to `next`.
    ///
    /// `partial -> partial` is allowed so the paid amount can change.
    pub fn can_transition_to(&self, next: ChargeStatus) -> bool {
        use ChargeStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Overdue | Cancelled | Partial)
                | (Overdue, Pending | Paid | Cancelled | Partial)
                | (Partial, Pending | Paid | Overdue | Cancelled | Partial)
                | (Paid, Pending)
        )
    }

    /// Statuses that still expect money.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ChargeStatus::Pending | ChargeStatus::Overdue | ChargeStatus::Partial
        )
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = ChargeTransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChargeStatus::Pending),
            "paid" => Ok(ChargeStatus::Paid),
            "overdue" => Ok(ChargeStatus::Overdue),
            "cancelled" => Ok(ChargeStatus::Cancelled),
            "partial" => Ok(ChargeStatus::Partial),
            other => Err(ChargeTransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// How a charge came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeOrigin {
    Manual,
    Generated,
}

impl ChargeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeOrigin::Manual => "manual",
            ChargeOrigin::Generated => "generated",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChargeTransitionError {
    #[error("unknown charge status '{0}'")]
    UnknownStatus(String),

    #[error("cannot move charge from {from} to {to}")]
    InvalidTransition { from: ChargeStatus, to: ChargeStatus },

    #[error("partial payment must be between 0 and {amount_cents} exclusive, got {amount_paid_cents}")]
    InvalidPartialAmount {
        amount_cents: i64,
        amount_paid_cents: i64,
    },

    #[error("partial status requires amount_paid_cents")]
    MissingPartialAmount,
}

impl From<ChargeTransitionError> for AppError {
    fn from(err: ChargeTransitionError) -> Self {
        AppError::BadRequest(anyhow::Error::new(err))
    }
}

/// Requested status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: ChargeStatus,
    pub amount_paid_cents: Option<i64>,
    pub payment_method: Option<String>,
    pub paid_utc: Option<DateTime<Utc>>,
}

impl StatusChange {
    pub fn to(status: ChargeStatus) -> Self {
        Self {
            status,
            amount_paid_cents: None,
            payment_method: None,
            paid_utc: None,
        }
    }

    pub fn paid(payment_method: impl Into<String>, paid_utc: Option<DateTime<Utc>>) -> Self {
        Self {
            status: ChargeStatus::Paid,
            amount_paid_cents: None,
            payment_method: Some(payment_method.into()),
            paid_utc,
        }
    }
}

/// A billed obligation for one athlete in one billing period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Charge {
    pub charge_id: Uuid,
    pub academy_id: Uuid,
    pub athlete_id: Uuid,
    pub group_id: Option<Uuid>,
    pub billing_item_id: Option<Uuid>,
    pub period: String,
    pub description: String,
    pub amount_cents: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub payment_method: Option<String>,
    pub paid_utc: Option<DateTime<Utc>>,
    pub origin: String,
    pub notes: Option<String>,
    pub processor_session_id: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Charge {
    pub fn status(&self) -> Result<ChargeStatus, ChargeTransitionError> {
        self.status.parse()
    }

    pub fn balance_cents(&self) -> i64 {
        (self.amount_cents - self.amount_paid_cents).max(0)
    }

    /// Apply a status change, keeping `paid_utc` and `amount_paid_cents`
    /// consistent with the resulting status.
    ///
    /// `paid_utc` is set exactly when the charge ends up `paid`.
    pub fn apply_status_change(
        &mut self,
        change: StatusChange,
        now: DateTime<Utc>,
    ) -> Result<(), ChargeTransitionError> {
        let from = self.status()?;
        let to = change.status;

        if !from.can_transition_to(to) {
            return Err(ChargeTransitionError::InvalidTransition { from, to });
        }

        match to {
            ChargeStatus::Paid => {
                self.amount_paid_cents = self.amount_cents;
                self.paid_utc = Some(change.paid_utc.unwrap_or(now));
                if change.payment_method.is_some() {
                    self.payment_method = change.payment_method;
                }
            }
            ChargeStatus::Partial => {
                let amount_paid_cents = change
                    .amount_paid_cents
                    .ok_or(ChargeTransitionError::MissingPartialAmount)?;
                if amount_paid_cents <= 0 || amount_paid_cents >= self.amount_cents {
                    return Err(ChargeTransitionError::InvalidPartialAmount {
                        amount_cents: self.amount_cents,
                        amount_paid_cents,
                    });
                }
                self.amount_paid_cents = amount_paid_cents;
                self.paid_utc = None;
                if change.payment_method.is_some() {
                    self.payment_method = change.payment_method;
                }
            }
            ChargeStatus::Pending | ChargeStatus::Cancelled => {
                if from != ChargeStatus::Partial {
                    self.amount_paid_cents = 0;
                }
                if from == ChargeStatus::Paid {
                    self.payment_method = None;
                }
                self.paid_utc = None;
            }
            ChargeStatus::Overdue => {
                self.paid_utc = None;
            }
        }

        self.status = to.as_str().to_string();
        self.updated_utc = now;
        Ok(())
    }
}

/// Filter parameters for listing charges.
#[derive(Debug, Clone, Default)]
pub struct ListChargesFilter {
    pub period: Option<String>,
    pub status: Option<ChargeStatus>,
    pub athlete_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

/// Outcome of writing one generated charge.
#[derive(Debug, Clone)]
pub enum GeneratedChargeWrite {
    Created(Charge),
    Updated(Charge),
    Skipped,
}
