//! Plan limit enforcement and plan changes.

use crate::models::{Notification, PlanCode, PlanResource, PlanViolation, Subscription};
use crate::services::metrics::record_plan_change;
use crate::services::store::Store;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The owner's subscription, or an implicit free one.
pub async fn current_subscription(
    store: &dyn Store,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Subscription, AppError> {
    Ok(store
        .get_subscription(owner_id)
        .await?
        .unwrap_or_else(|| Subscription::implicit_free(owner_id, now)))
}

/// Fail with `Forbidden` unless one more `resource` fits the owner's plan.
#[instrument(skip(store))]
pub async fn ensure_capacity(
    store: &dyn Store,
    owner_id: Uuid,
    resource: PlanResource,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let plan = current_subscription(store, owner_id, now).await?.plan();
    let limits = plan.limits();
    let usage = store.usage_for_owner(owner_id).await?;

    if limits.allows(&usage, resource, 1) {
        return Ok(());
    }

    let limit = limits.get(resource).unwrap_or_default();
    warn!(plan_code = %plan, resource = %resource, limit = limit, "Plan limit reached");
    Err(AppError::Forbidden(anyhow::anyhow!(
        "plan limit reached: the {} plan allows {} {}",
        plan,
        limit,
        resource
    )))
}

#[derive(Debug, Clone)]
pub struct PlanChangeOutcome {
    pub applied: bool,
    /// The plan in effect after the call.
    pub plan_code: PlanCode,
    pub violations: Vec<PlanViolation>,
    pub forced: bool,
}

fn violation_summary(violations: &[PlanViolation]) -> String {
    violations
        .iter()
        .map(|v| {
            format!(
                "{}: {} in use, limit {} (remove {})",
                v.resource, v.current, v.limit, v.excess
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Move the owner down to `target`.
///
/// Paid tiers are only granted through processor checkout, so a target
/// above the current plan is `BadRequest`. When current usage exceeds the
/// target's limits the change is refused unless `force` is set; a forced
/// change notifies the owner of what to reduce.
#[instrument(skip(store))]
pub async fn change_plan(
    store: &dyn Store,
    owner_id: Uuid,
    target: PlanCode,
    force: bool,
    now: DateTime<Utc>,
) -> Result<PlanChangeOutcome, AppError> {
    let mut subscription = current_subscription(store, owner_id, now).await?;
    let current = subscription.plan();
    if current.is_downgrade_from(target) {
        record_plan_change(target.as_str(), "rejected");
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Upgrading from {} to {} requires payment; use /api/subscription/checkout",
            current,
            target
        )));
    }

    let usage = store.usage_for_owner(owner_id).await?;
    let violations = target.limits().violations(&usage);

    if !violations.is_empty() && !force {
        record_plan_change(target.as_str(), "rejected");
        info!(
            current = %current,
            target = %target,
            violations = violations.len(),
            "Plan change rejected over limits"
        );
        return Ok(PlanChangeOutcome {
            applied: false,
            plan_code: current,
            violations,
            forced: false,
        });
    }

    subscription.plan_code = target.as_str().to_string();
    subscription.updated_utc = now;
    store.upsert_subscription(&subscription).await?;

    let forced = !violations.is_empty();
    if forced {
        let notification = Notification {
            notification_id: Uuid::new_v4(),
            owner_id,
            kind: "plan_limit_exceeded".to_string(),
            title: format!("Your {} plan limits are exceeded", target),
            body: format!(
                "Reduce usage to fit the {} plan. {}",
                target,
                violation_summary(&violations)
            ),
            metadata: serde_json::json!({
                "plan_code": target,
                "previous_plan_code": current,
                "violations": violations,
            }),
            read_utc: None,
            created_utc: now,
        };
        store.insert_notification(&notification).await?;
    }

    record_plan_change(target.as_str(), if forced { "forced" } else { "applied" });
    info!(previous = %current, plan_code = %target, forced = forced, "Plan changed");

    Ok(PlanChangeOutcome {
        applied: true,
        plan_code: target,
        violations,
        forced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanUsage;
    use crate::services::store::{MemoryStore, SubscriptionStore as _};

    #[test]
    fn summary_lists_each_violation() {
        let violations = PlanCode::Free.limits().violations(&PlanUsage {
            academies: 1,
            athletes: 18,
            classes: 7,
            groups: 2,
        });
        let summary = violation_summary(&violations);
        assert_eq!(
            summary,
            "athletes: 18 in use, limit 15 (remove 3); classes: 7 in use, limit 5 (remove 2)"
        );
    }

    #[tokio::test]
    async fn upgrades_are_refused_without_checkout() {
        let store = MemoryStore::new();
        let owner_id = Uuid::new_v4();

        let err = change_plan(&store, owner_id, PlanCode::Enterprise, false, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(store.get_subscription(owner_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn downgrade_within_limits_is_applied() {
        let store = MemoryStore::new();
        let owner_id = Uuid::new_v4();
        let mut subscription = Subscription::implicit_free(owner_id, Utc::now());
        subscription.plan_code = PlanCode::Pro.as_str().to_string();
        store.upsert_subscription(&subscription).await.unwrap();

        let outcome = change_plan(&store, owner_id, PlanCode::Starter, false, Utc::now())
            .await
            .unwrap();
        assert!(outcome.applied);
        assert!(!outcome.forced);
        assert_eq!(outcome.plan_code, PlanCode::Starter);
    }
}
