//! Guardian payment reminders.
//!
//! The scan only enqueues outbox rows; the dedupe key makes reruns on the
//! same day (or the same overdue week) harmless.

use crate::models::{Academy, Charge, ChargeStatus, EmailLog};
use crate::services::email::EmailOutbox;
use crate::services::store::Store;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Upcoming,
    Overdue,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Upcoming => "upcoming",
            ReminderKind::Overdue => "overdue",
        }
    }

    fn email_kind(&self) -> &'static str {
        match self {
            ReminderKind::Upcoming => "reminder_upcoming",
            ReminderKind::Overdue => "reminder_overdue",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderScanSummary {
    /// Charges that called for a reminder.
    pub scanned: u64,
    pub enqueued: u64,
    /// Recipients already reminded in this window, or without an email.
    pub skipped: u64,
}

/// Which reminder, if any, a charge calls for today, and its dedupe window.
fn classify(charge: &Charge, today: NaiveDate, days_before: i64) -> Option<(ReminderKind, String)> {
    let status = charge.status().ok()?;
    match status {
        ChargeStatus::Pending | ChargeStatus::Partial
            if charge.due_date == today + Duration::days(days_before) =>
        {
            Some((ReminderKind::Upcoming, charge.due_date.to_string()))
        }
        ChargeStatus::Overdue | ChargeStatus::Partial if charge.due_date < today => {
            let week = (today - charge.due_date).num_days() / 7;
            Some((ReminderKind::Overdue, format!("w{}", week)))
        }
        _ => None,
    }
}

fn dedupe_key(kind: ReminderKind, charge: &Charge, guardian_id: Uuid, window: &str) -> String {
    format!(
        "reminder:{}:{}:{}:{}",
        kind.as_str(),
        charge.charge_id,
        guardian_id,
        window
    )
}

/// `1234` cents as `12.34`.
fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

fn compose(
    kind: ReminderKind,
    academy: &Academy,
    guardian_name: &str,
    athlete_name: &str,
    charge: &Charge,
) -> (String, String) {
    let amount = format!("{} {}", format_amount(charge.balance_cents()), charge.currency);
    match kind {
        ReminderKind::Upcoming => (
            format!("{}: payment due on {}", academy.name, charge.due_date),
            format!(
                "Hello {},\n\n{} for {} ({}) is due on {}.\n\n{}",
                guardian_name, charge.description, athlete_name, amount, charge.due_date, academy.name
            ),
        ),
        ReminderKind::Overdue => (
            format!("{}: overdue payment", academy.name),
            format!(
                "Hello {},\n\n{} for {} ({}) was due on {} and is still unpaid.\n\n{}",
                guardian_name, charge.description, athlete_name, amount, charge.due_date, academy.name
            ),
        ),
    }
}

pub struct ReminderScanner {
    store: Arc<dyn Store>,
    outbox: EmailOutbox,
    days_before: i64,
}

impl ReminderScanner {
    pub fn new(store: Arc<dyn Store>, outbox: EmailOutbox, days_before: i64) -> Self {
        Self {
            store,
            outbox,
            days_before,
        }
    }

    #[instrument(skip(self))]
    pub async fn scan(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<ReminderScanSummary, AppError> {
        let mut summary = ReminderScanSummary::default();
        let horizon = today + Duration::days(self.days_before);

        for academy in self.store.list_all_academies().await? {
            let charges = self
                .store
                .list_open_charges_due_by(academy.academy_id, horizon)
                .await?;

            for charge in &charges {
                let Some((kind, window)) = classify(charge, today, self.days_before) else {
                    continue;
                };
                summary.scanned += 1;

                if let Err(e) = self
                    .remind(&academy, charge, kind, &window, now, &mut summary)
                    .await
                {
                    warn!(charge_id = %charge.charge_id, error = %e, "Failed to queue reminders for charge");
                }
            }
        }

        info!(
            scanned = summary.scanned,
            enqueued = summary.enqueued,
            skipped = summary.skipped,
            "Reminder scan finished"
        );
        Ok(summary)
    }

    async fn remind(
        &self,
        academy: &Academy,
        charge: &Charge,
        kind: ReminderKind,
        window: &str,
        now: DateTime<Utc>,
        summary: &mut ReminderScanSummary,
    ) -> Result<(), AppError> {
        let athlete_name = self
            .store
            .get_athlete(academy.academy_id, charge.athlete_id)
            .await?
            .map(|a| a.full_name())
            .unwrap_or_default();

        for guardian in self.store.list_athlete_guardians(charge.athlete_id).await? {
            let Some(address) = guardian.email.as_deref().filter(|e| !e.is_empty()) else {
                summary.skipped += 1;
                continue;
            };

            let (subject, body) = compose(kind, academy, &guardian.full_name, &athlete_name, charge);
            let email = EmailLog::pending(
                Some(academy.academy_id),
                address,
                subject,
                body,
                kind.email_kind(),
                Some(dedupe_key(kind, charge, guardian.guardian_id, window)),
                now,
            );

            match self.outbox.enqueue(&email).await {
                Ok(true) => summary.enqueued += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    summary.skipped += 1;
                    warn!(guardian_id = %guardian.guardian_id, error = %e, "Failed to queue reminder");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChargeOrigin;

    fn charge(status: ChargeStatus, due_date: NaiveDate) -> Charge {
        let now = Utc::now();
        Charge {
            charge_id: Uuid::new_v4(),
            academy_id: Uuid::new_v4(),
            athlete_id: Uuid::new_v4(),
            group_id: None,
            billing_item_id: None,
            period: "2026-03".to_string(),
            description: "Juniors – March 2026".to_string(),
            amount_cents: 5000,
            amount_paid_cents: 0,
            currency: "EUR".to_string(),
            due_date,
            status: status.as_str().to_string(),
            payment_method: None,
            paid_utc: None,
            origin: ChargeOrigin::Generated.as_str().to_string(),
            notes: None,
            processor_session_id: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[test]
    fn upcoming_only_on_exact_lead_day() {
        let c = charge(ChargeStatus::Pending, date(8));
        assert_eq!(
            classify(&c, date(5), 3),
            Some((ReminderKind::Upcoming, "2026-03-08".to_string()))
        );
        assert_eq!(classify(&c, date(4), 3), None);
        assert_eq!(classify(&c, date(6), 3), None);
    }

    #[test]
    fn overdue_window_is_weekly() {
        let c = charge(ChargeStatus::Overdue, date(1));
        assert_eq!(classify(&c, date(2), 3).map(|(_, w)| w), Some("w0".to_string()));
        assert_eq!(classify(&c, date(8), 3).map(|(_, w)| w), Some("w1".to_string()));
        assert_eq!(classify(&c, date(14), 3).map(|(_, w)| w), Some("w1".to_string()));
    }

    #[test]
    fn past_due_partial_is_overdue() {
        let mut c = charge(ChargeStatus::Partial, date(1));
        c.amount_paid_cents = 1000;
        assert_eq!(
            classify(&c, date(20), 3),
            Some((ReminderKind::Overdue, "w2".to_string()))
        );
        assert_eq!(classify(&c, date(1), 3), None);
    }

    #[test]
    fn paid_and_cancelled_never_remind() {
        assert_eq!(classify(&charge(ChargeStatus::Paid, date(8)), date(5), 3), None);
        assert_eq!(classify(&charge(ChargeStatus::Cancelled, date(1)), date(5), 3), None);
    }

    #[test]
    fn amounts_render_with_two_decimals() {
        assert_eq!(format_amount(5000), "50.00");
        assert_eq!(format_amount(1234), "12.34");
        assert_eq!(format_amount(5), "0.05");
    }
}
