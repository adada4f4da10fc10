//! Monthly charge generation.
//!
//! One charge per active membership of an active athlete in an active
//! group. The (academy, athlete, period, group) key is enforced by the
//! store, so concurrent runs cannot double-bill. Charges of any origin
//! that already cover a membership for the period block a new one.

use crate::models::{
    BillingItem, BillingPeriod, Charge, ChargeOrigin, ChargeStatus, GeneratedChargeWrite,
    GenerationCandidate,
};
use crate::services::metrics::record_generation;
use crate::services::store::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GenerateCharges {
    pub academy_id: Uuid,
    pub group_id: Option<Uuid>,
    pub period: BillingPeriod,
    pub skip_duplicates: bool,
    /// Clamped to the length of the month.
    pub due_day: u32,
    pub fallback_billing_item_id: Option<Uuid>,
}

/// A membership no fee could be resolved for.
#[derive(Debug, Clone, Serialize)]
pub struct UnpricedMembership {
    pub athlete_id: Uuid,
    pub athlete_name: String,
    pub group_id: Uuid,
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub period: String,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub unpriced: Vec<UnpricedMembership>,
    /// Charges created or refreshed by this run.
    pub charges: Vec<Charge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedFee {
    amount_cents: i64,
    /// Set when the fee came from a billing item.
    billing_item_id: Option<Uuid>,
    item_currency: Option<String>,
}

/// An open or settled charge of any origin already billing this
/// membership for the period: same athlete, and the same group or the
/// same billing item.
fn covering_charge<'a>(
    existing: &'a [Charge],
    candidate: &GenerationCandidate,
    fee: &ResolvedFee,
) -> Option<&'a Charge> {
    existing.iter().find(|c| {
        c.athlete_id == candidate.athlete_id
            && c.status != ChargeStatus::Cancelled.as_str()
            && (c.group_id == Some(candidate.group_id)
                || (fee.billing_item_id.is_some() && c.billing_item_id == fee.billing_item_id))
    })
}

/// Membership override, then group fee, then the group's active item,
/// then the active fallback item.
fn resolve_fee(
    candidate: &GenerationCandidate,
    fallback: Option<&BillingItem>,
) -> Option<ResolvedFee> {
    if let Some(amount_cents) = candidate.custom_fee_cents.or(candidate.group_fee_cents) {
        return Some(ResolvedFee {
            amount_cents,
            billing_item_id: None,
            item_currency: None,
        });
    }

    if candidate.item_is_active == Some(true) {
        if let Some(amount_cents) = candidate.item_amount_cents {
            return Some(ResolvedFee {
                amount_cents,
                billing_item_id: candidate.billing_item_id,
                item_currency: candidate.item_currency.clone(),
            });
        }
    }

    fallback
        .filter(|item| item.is_active)
        .map(|item| ResolvedFee {
            amount_cents: item.amount_cents,
            billing_item_id: Some(item.billing_item_id),
            item_currency: Some(item.currency.clone()),
        })
}

#[instrument(skip(store, request), fields(academy_id = %request.academy_id, period = %request.period))]
pub async fn generate_charges(
    store: &dyn Store,
    request: &GenerateCharges,
    now: DateTime<Utc>,
) -> Result<GenerationSummary, AppError> {
    let academy = store
        .get_academy(request.academy_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Academy not found")))?;

    if let Some(group_id) = request.group_id {
        store
            .get_group(request.academy_id, group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Group not found")))?;
    }

    let fallback = match request.fallback_billing_item_id {
        Some(item_id) => Some(
            store
                .get_billing_item(request.academy_id, item_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing item not found")))?,
        ),
        None => None,
    };

    let candidates = store
        .generation_candidates(request.academy_id, request.group_id)
        .await?;

    let period = request.period.to_string();
    let existing = store
        .list_period_charges(request.academy_id, &period)
        .await?;
    let label = request.period.label();
    let due_date = request.period.due_date(request.due_day);

    let mut summary = GenerationSummary {
        period: period.clone(),
        created: 0,
        updated: 0,
        skipped: 0,
        unpriced: Vec::new(),
        charges: Vec::new(),
    };

    for candidate in &candidates {
        let Some(fee) = resolve_fee(candidate, fallback.as_ref()) else {
            summary.unpriced.push(UnpricedMembership {
                athlete_id: candidate.athlete_id,
                athlete_name: format!("{} {}", candidate.first_name, candidate.last_name),
                group_id: candidate.group_id,
                group_name: candidate.group_name.clone(),
            });
            continue;
        };

        if let Some(covering) = covering_charge(&existing, candidate, &fee) {
            // Manual charges are never overwritten by a regeneration.
            if request.skip_duplicates || covering.origin != ChargeOrigin::Generated.as_str() {
                summary.skipped += 1;
                continue;
            }
        }

        let charge = Charge {
            charge_id: Uuid::new_v4(),
            academy_id: request.academy_id,
            athlete_id: candidate.athlete_id,
            group_id: Some(candidate.group_id),
            billing_item_id: fee.billing_item_id,
            period: period.clone(),
            description: format!("{} – {}", candidate.group_name, label),
            amount_cents: fee.amount_cents,
            amount_paid_cents: 0,
            currency: fee.item_currency.unwrap_or_else(|| academy.currency.clone()),
            due_date,
            status: ChargeStatus::Pending.as_str().to_string(),
            payment_method: None,
            paid_utc: None,
            origin: ChargeOrigin::Generated.as_str().to_string(),
            notes: None,
            processor_session_id: None,
            created_utc: now,
            updated_utc: now,
        };

        match store
            .write_generated_charge(&charge, !request.skip_duplicates)
            .await?
        {
            GeneratedChargeWrite::Created(charge) => {
                summary.created += 1;
                summary.charges.push(charge);
            }
            GeneratedChargeWrite::Updated(charge) => {
                summary.updated += 1;
                summary.charges.push(charge);
            }
            GeneratedChargeWrite::Skipped => summary.skipped += 1,
        }
    }

    record_generation(
        summary.created,
        summary.updated,
        summary.skipped,
        summary.unpriced.len() as u64,
    );
    info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        unpriced = summary.unpriced.len(),
        "Charge generation finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> GenerationCandidate {
        GenerationCandidate {
            athlete_id: Uuid::new_v4(),
            first_name: "Ana".to_string(),
            last_name: "Ruiz".to_string(),
            group_id: Uuid::new_v4(),
            group_name: "Juniors".to_string(),
            custom_fee_cents: None,
            group_fee_cents: None,
            billing_item_id: None,
            item_amount_cents: None,
            item_currency: None,
            item_is_active: None,
        }
    }

    fn item(amount_cents: i64, is_active: bool) -> BillingItem {
        let now = Utc::now();
        BillingItem {
            billing_item_id: Uuid::new_v4(),
            academy_id: Uuid::new_v4(),
            name: "Monthly fee".to_string(),
            description: None,
            amount_cents,
            currency: "USD".to_string(),
            periodicity: "monthly".to_string(),
            is_active,
            created_utc: now,
            updated_utc: now,
        }
    }

    fn charge_for(candidate: &GenerationCandidate, origin: ChargeOrigin) -> Charge {
        let now = Utc::now();
        Charge {
            charge_id: Uuid::new_v4(),
            academy_id: Uuid::new_v4(),
            athlete_id: candidate.athlete_id,
            group_id: None,
            billing_item_id: None,
            period: "2026-03".to_string(),
            description: "Tuition".to_string(),
            amount_cents: 5000,
            amount_paid_cents: 0,
            currency: "USD".to_string(),
            due_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            status: ChargeStatus::Pending.as_str().to_string(),
            payment_method: None,
            paid_utc: None,
            origin: origin.as_str().to_string(),
            notes: None,
            processor_session_id: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn manual_charge_for_same_group_or_item_covers_membership() {
        let c = candidate();
        let item_id = Uuid::new_v4();
        let fee = ResolvedFee {
            amount_cents: 5000,
            billing_item_id: Some(item_id),
            item_currency: None,
        };

        let mut by_group = charge_for(&c, ChargeOrigin::Manual);
        by_group.group_id = Some(c.group_id);
        assert!(covering_charge(std::slice::from_ref(&by_group), &c, &fee).is_some());

        let mut by_item = charge_for(&c, ChargeOrigin::Manual);
        by_item.billing_item_id = Some(item_id);
        assert!(covering_charge(std::slice::from_ref(&by_item), &c, &fee).is_some());

        let unrelated = charge_for(&c, ChargeOrigin::Manual);
        assert!(covering_charge(std::slice::from_ref(&unrelated), &c, &fee).is_none());

        by_group.status = ChargeStatus::Cancelled.as_str().to_string();
        assert!(covering_charge(std::slice::from_ref(&by_group), &c, &fee).is_none());
    }

    #[test]
    fn custom_fee_wins_over_group_fee() {
        let mut c = candidate();
        c.custom_fee_cents = Some(2000);
        c.group_fee_cents = Some(5000);
        assert_eq!(resolve_fee(&c, None).map(|f| f.amount_cents), Some(2000));

        c.custom_fee_cents = None;
        assert_eq!(resolve_fee(&c, None).map(|f| f.amount_cents), Some(5000));
    }

    #[test]
    fn group_item_used_only_when_active() {
        let mut c = candidate();
        let item_id = Uuid::new_v4();
        c.billing_item_id = Some(item_id);
        c.item_amount_cents = Some(3000);
        c.item_currency = Some("USD".to_string());
        c.item_is_active = Some(true);

        let fee = resolve_fee(&c, None).unwrap();
        assert_eq!(fee.amount_cents, 3000);
        assert_eq!(fee.billing_item_id, Some(item_id));
        assert_eq!(fee.item_currency.as_deref(), Some("USD"));

        c.item_is_active = Some(false);
        assert_eq!(resolve_fee(&c, None), None);
    }

    #[test]
    fn inactive_fallback_leaves_membership_unpriced() {
        let c = candidate();
        let active = item(1500, true);
        assert_eq!(
            resolve_fee(&c, Some(&active)).map(|f| f.amount_cents),
            Some(1500)
        );
        assert_eq!(resolve_fee(&c, Some(&item(1500, false))), None);
    }
}
