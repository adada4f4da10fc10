//! Charge status changes shared by handlers, webhooks and the worker.

use crate::models::{Charge, ChargeStatus, StatusChange};
use crate::services::metrics::record_charge_status_change;
use crate::services::store::Store;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use tracing::{info, instrument, warn};

/// Apply `change` to `charge` and persist it.
///
/// Invalid transitions are `BadRequest` and leave the stored row untouched.
#[instrument(skip(store, charge, change), fields(charge_id = %charge.charge_id, to = %change.status))]
pub async fn transition_charge(
    store: &dyn Store,
    mut charge: Charge,
    change: StatusChange,
    trigger: &str,
    now: DateTime<Utc>,
) -> Result<Charge, AppError> {
    let from = charge.status.clone();
    charge.apply_status_change(change, now)?;
    let saved = store.update_charge(&charge).await?;

    record_charge_status_change(&from, &saved.status, trigger);
    info!(from = %from, to = %saved.status, trigger = trigger, "Charge status changed");
    Ok(saved)
}

/// Move pending and partial charges due before `today` to overdue. Returns
/// how many moved.
#[instrument(skip(store))]
pub async fn sweep_overdue(
    store: &dyn Store,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let past_due = store.list_unpaid_past_due(today).await?;
    let mut moved = 0;

    for charge in past_due {
        let charge_id = charge.charge_id;
        match transition_charge(
            store,
            charge,
            StatusChange::to(ChargeStatus::Overdue),
            "overdue_sweep",
            now,
        )
        .await
        {
            Ok(_) => moved += 1,
            Err(e) => warn!(charge_id = %charge_id, error = %e, "Failed to mark charge overdue"),
        }
    }

    info!(moved = moved, today = %today, "Overdue sweep finished");
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChargeOrigin;
    use crate::services::store::{BillingStore as _, MemoryStore};
    use uuid::Uuid;

    fn pending_charge(due_date: NaiveDate) -> Charge {
        let now = Utc::now();
        Charge {
            charge_id: Uuid::new_v4(),
            academy_id: Uuid::new_v4(),
            athlete_id: Uuid::new_v4(),
            group_id: None,
            billing_item_id: None,
            period: "2026-03".to_string(),
            description: "Seniors – March 2026".to_string(),
            amount_cents: 4000,
            amount_paid_cents: 0,
            currency: "EUR".to_string(),
            due_date,
            status: ChargeStatus::Pending.as_str().to_string(),
            payment_method: None,
            paid_utc: None,
            origin: ChargeOrigin::Manual.as_str().to_string(),
            notes: None,
            processor_session_id: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[tokio::test]
    async fn sweep_moves_only_past_due_pending() {
        let store = MemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let late = store
            .insert_charge(&pending_charge(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()))
            .await
            .unwrap();
        let due_today = store.insert_charge(&pending_charge(today)).await.unwrap();

        let moved = sweep_overdue(&store, today, Utc::now()).await.unwrap();

        assert_eq!(moved, 1);
        let late = store.find_charge(late.charge_id).await.unwrap().unwrap();
        assert_eq!(late.status, "overdue");
        let due_today = store.find_charge(due_today.charge_id).await.unwrap().unwrap();
        assert_eq!(due_today.status, "pending");
    }

    #[tokio::test]
    async fn sweep_moves_past_due_partial_and_keeps_amount_paid() {
        let store = MemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let mut charge = pending_charge(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        charge.status = ChargeStatus::Partial.as_str().to_string();
        charge.amount_paid_cents = 1500;
        let charge = store.insert_charge(&charge).await.unwrap();

        let moved = sweep_overdue(&store, today, Utc::now()).await.unwrap();

        assert_eq!(moved, 1);
        let stored = store.find_charge(charge.charge_id).await.unwrap().unwrap();
        assert_eq!(stored.status, "overdue");
        assert_eq!(stored.amount_paid_cents, 1500);
        assert_eq!(stored.balance_cents(), 2500);
    }

    #[tokio::test]
    async fn invalid_transition_is_bad_request_and_not_saved() {
        let store = MemoryStore::new();
        let mut charge = pending_charge(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
        charge.status = ChargeStatus::Cancelled.as_str().to_string();
        let charge = store.insert_charge(&charge).await.unwrap();

        let err = transition_charge(
            &store,
            charge.clone(),
            StatusChange::paid("cash", None),
            "staff",
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        let stored = store.find_charge(charge.charge_id).await.unwrap().unwrap();
        assert_eq!(stored.status, "cancelled");
    }
}
