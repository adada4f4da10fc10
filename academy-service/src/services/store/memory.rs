//! In-memory store for tests and local runs without Postgres.
//!
//! Mirrors the uniqueness and reference rules of the SQL schema.

use super::{AcademyStore, BillingStore, EmailStore, RosterStore, Store, SubscriptionStore};
use crate::models::{
    Academy, Athlete, AthleteStatus, AttendanceRecord, BillingItem, Charge, ChargeOrigin,
    ChargeStatus, Class, DirectoryFilter, EmailLog, EmailStatus, GeneratedChargeWrite,
    GenerationCandidate, Group, GroupMembership, Guardian, ListAthletesFilter, ListChargesFilter,
    Notification, PlanUsage, ProcessorInvoice, Subscription,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    academies: HashMap<Uuid, Academy>,
    athletes: HashMap<Uuid, Athlete>,
    guardians: HashMap<Uuid, Guardian>,
    athlete_guardians: HashSet<(Uuid, Uuid)>,
    groups: HashMap<Uuid, Group>,
    memberships: HashMap<(Uuid, Uuid), GroupMembership>,
    classes: HashMap<Uuid, Class>,
    attendance: HashMap<(Uuid, Uuid, NaiveDate), AttendanceRecord>,
    billing_items: HashMap<Uuid, BillingItem>,
    charges: HashMap<Uuid, Charge>,
    subscriptions: HashMap<Uuid, Subscription>,
    invoices: HashMap<String, ProcessorInvoice>,
    notifications: Vec<Notification>,
    emails: Vec<EmailLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let page = items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect();
    (page, total)
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} not found", what))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl AcademyStore for MemoryStore {
    async fn insert_academy(&self, academy: &Academy) -> Result<Academy, AppError> {
        let mut state = self.state.write().await;
        if state.academies.values().any(|a| a.slug == academy.slug) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Academy slug '{}' is already taken",
                academy.slug
            )));
        }
        state.academies.insert(academy.academy_id, academy.clone());
        Ok(academy.clone())
    }

    async fn get_academy(&self, academy_id: Uuid) -> Result<Option<Academy>, AppError> {
        Ok(self.state.read().await.academies.get(&academy_id).cloned())
    }

    async fn get_academy_by_slug(&self, slug: &str) -> Result<Option<Academy>, AppError> {
        let state = self.state.read().await;
        Ok(state.academies.values().find(|a| a.slug == slug).cloned())
    }

    async fn list_owned_academies(&self, owner_id: Uuid) -> Result<Vec<Academy>, AppError> {
        let state = self.state.read().await;
        let mut academies: Vec<Academy> = state
            .academies
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        academies.sort_by_key(|a| a.created_utc);
        Ok(academies)
    }

    async fn list_all_academies(&self) -> Result<Vec<Academy>, AppError> {
        let state = self.state.read().await;
        let mut academies: Vec<Academy> = state.academies.values().cloned().collect();
        academies.sort_by_key(|a| a.created_utc);
        Ok(academies)
    }

    async fn update_academy(&self, academy: &Academy) -> Result<Academy, AppError> {
        let mut state = self.state.write().await;
        if state
            .academies
            .values()
            .any(|a| a.slug == academy.slug && a.academy_id != academy.academy_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Academy slug '{}' is already taken",
                academy.slug
            )));
        }
        let slot = state
            .academies
            .get_mut(&academy.academy_id)
            .ok_or_else(|| not_found("Academy"))?;
        *slot = academy.clone();
        Ok(academy.clone())
    }

    async fn list_public_academies(
        &self,
        filter: &DirectoryFilter,
    ) -> Result<(Vec<Academy>, i64), AppError> {
        let state = self.state.read().await;
        let mut academies: Vec<Academy> = state
            .academies
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        academies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(academies, filter.limit, filter.offset))
    }

    async fn usage_for_owner(&self, owner_id: Uuid) -> Result<PlanUsage, AppError> {
        let state = self.state.read().await;
        let owned: HashSet<Uuid> = state
            .academies
            .values()
            .filter(|a| a.owner_id == owner_id)
            .map(|a| a.academy_id)
            .collect();

        Ok(PlanUsage {
            academies: owned.len() as i64,
            athletes: state
                .athletes
                .values()
                .filter(|t| owned.contains(&t.academy_id) && t.is_active())
                .count() as i64,
            classes: state
                .classes
                .values()
                .filter(|c| owned.contains(&c.academy_id) && c.is_active)
                .count() as i64,
            groups: state
                .groups
                .values()
                .filter(|g| owned.contains(&g.academy_id) && g.is_active)
                .count() as i64,
        })
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
    async fn insert_athlete(&self, athlete: &Athlete) -> Result<Athlete, AppError> {
        let mut state = self.state.write().await;
        state.athletes.insert(athlete.athlete_id, athlete.clone());
        Ok(athlete.clone())
    }

    async fn get_athlete(
        &self,
        academy_id: Uuid,
        athlete_id: Uuid,
    ) -> Result<Option<Athlete>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .athletes
            .get(&athlete_id)
            .filter(|a| a.academy_id == academy_id)
            .cloned())
    }

    async fn list_athletes(
        &self,
        academy_id: Uuid,
        filter: &ListAthletesFilter,
    ) -> Result<(Vec<Athlete>, i64), AppError> {
        let state = self.state.read().await;
        let mut athletes: Vec<Athlete> = state
            .athletes
            .values()
            .filter(|a| a.academy_id == academy_id)
            .filter(|a| {
                filter
                    .status
                    .is_none_or(|s| AthleteStatus::from_string(&a.status) == s)
            })
            .filter(|a| {
                filter.query.as_deref().is_none_or(|q| {
                    contains_ci(&a.first_name, q) || contains_ci(&a.last_name, q)
                })
            })
            .cloned()
            .collect();
        athletes.sort_by(|a, b| {
            (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name))
        });
        Ok(page(athletes, filter.limit, filter.offset))
    }

    async fn update_athlete(&self, athlete: &Athlete) -> Result<Athlete, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .athletes
            .get_mut(&athlete.athlete_id)
            .filter(|a| a.academy_id == athlete.academy_id)
            .ok_or_else(|| not_found("Athlete"))?;
        *slot = athlete.clone();
        Ok(athlete.clone())
    }

    async fn insert_guardian(&self, guardian: &Guardian) -> Result<Guardian, AppError> {
        let mut state = self.state.write().await;
        state.guardians.insert(guardian.guardian_id, guardian.clone());
        Ok(guardian.clone())
    }

    async fn get_guardian(
        &self,
        academy_id: Uuid,
        guardian_id: Uuid,
    ) -> Result<Option<Guardian>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .guardians
            .get(&guardian_id)
            .filter(|g| g.academy_id == academy_id)
            .cloned())
    }

    async fn list_guardians(
        &self,
        academy_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Guardian>, i64), AppError> {
        let state = self.state.read().await;
        let mut guardians: Vec<Guardian> = state
            .guardians
            .values()
            .filter(|g| g.academy_id == academy_id)
            .cloned()
            .collect();
        guardians.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(page(guardians, limit, offset))
    }

    async fn update_guardian(&self, guardian: &Guardian) -> Result<Guardian, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .guardians
            .get_mut(&guardian.guardian_id)
            .filter(|g| g.academy_id == guardian.academy_id)
            .ok_or_else(|| not_found("Guardian"))?;
        *slot = guardian.clone();
        Ok(guardian.clone())
    }

    async fn delete_guardian(&self, academy_id: Uuid, guardian_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .guardians
            .get(&guardian_id)
            .is_some_and(|g| g.academy_id == academy_id);
        if !owned {
            return Ok(false);
        }
        state.guardians.remove(&guardian_id);
        state
            .athlete_guardians
            .retain(|&(_, linked)| linked != guardian_id);
        Ok(true)
    }

    async fn link_guardian(&self, athlete_id: Uuid, guardian_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if !state.athletes.contains_key(&athlete_id) || !state.guardians.contains_key(&guardian_id)
        {
            return Err(AppError::ForeignKeyViolation(anyhow::anyhow!(
                "Athlete or guardian does not exist"
            )));
        }
        state.athlete_guardians.insert((athlete_id, guardian_id));
        Ok(())
    }

    async fn unlink_guardian(&self, athlete_id: Uuid, guardian_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        Ok(state.athlete_guardians.remove(&(athlete_id, guardian_id)))
    }

    async fn list_athlete_guardians(&self, athlete_id: Uuid) -> Result<Vec<Guardian>, AppError> {
        let state = self.state.read().await;
        let mut guardians: Vec<Guardian> = state
            .athlete_guardians
            .iter()
            .filter(|(athlete, _)| *athlete == athlete_id)
            .filter_map(|(_, guardian)| state.guardians.get(guardian).cloned())
            .collect();
        guardians.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(guardians)
    }

    async fn insert_group(&self, group: &Group) -> Result<Group, AppError> {
        let mut state = self.state.write().await;
        state.groups.insert(group.group_id, group.clone());
        Ok(group.clone())
    }

    async fn get_group(&self, academy_id: Uuid, group_id: Uuid) -> Result<Option<Group>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .get(&group_id)
            .filter(|g| g.academy_id == academy_id)
            .cloned())
    }

    async fn list_groups(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Group>, AppError> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .values()
            .filter(|g| g.academy_id == academy_id && (include_inactive || g.is_active))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn update_group(&self, group: &Group) -> Result<Group, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .groups
            .get_mut(&group.group_id)
            .filter(|g| g.academy_id == group.academy_id)
            .ok_or_else(|| not_found("Group"))?;
        *slot = group.clone();
        Ok(group.clone())
    }

    async fn upsert_membership(
        &self,
        membership: &GroupMembership,
    ) -> Result<GroupMembership, AppError> {
        let mut state = self.state.write().await;
        let key = (membership.group_id, membership.athlete_id);
        let saved = match state.memberships.get(&key) {
            Some(existing) => GroupMembership {
                joined_utc: existing.joined_utc,
                ..membership.clone()
            },
            None => membership.clone(),
        };
        state.memberships.insert(key, saved.clone());
        Ok(saved)
    }

    async fn get_membership(
        &self,
        group_id: Uuid,
        athlete_id: Uuid,
    ) -> Result<Option<GroupMembership>, AppError> {
        let state = self.state.read().await;
        Ok(state.memberships.get(&(group_id, athlete_id)).cloned())
    }

    async fn list_memberships(&self, group_id: Uuid) -> Result<Vec<GroupMembership>, AppError> {
        let state = self.state.read().await;
        let mut memberships: Vec<GroupMembership> = state
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.joined_utc);
        Ok(memberships)
    }

    async fn delete_membership(&self, group_id: Uuid, athlete_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        Ok(state.memberships.remove(&(group_id, athlete_id)).is_some())
    }

    async fn insert_class(&self, class: &Class) -> Result<Class, AppError> {
        let mut state = self.state.write().await;
        state.classes.insert(class.class_id, class.clone());
        Ok(class.clone())
    }

    async fn get_class(&self, academy_id: Uuid, class_id: Uuid) -> Result<Option<Class>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .classes
            .get(&class_id)
            .filter(|c| c.academy_id == academy_id)
            .cloned())
    }

    async fn list_classes(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Class>, AppError> {
        let state = self.state.read().await;
        let mut classes: Vec<Class> = state
            .classes
            .values()
            .filter(|c| c.academy_id == academy_id && (include_inactive || c.is_active))
            .cloned()
            .collect();
        classes.sort_by(|a, b| (a.weekday, &a.start_time).cmp(&(b.weekday, &b.start_time)));
        Ok(classes)
    }

    async fn update_class(&self, class: &Class) -> Result<Class, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .classes
            .get_mut(&class.class_id)
            .filter(|c| c.academy_id == class.academy_id)
            .ok_or_else(|| not_found("Class"))?;
        *slot = class.clone();
        Ok(class.clone())
    }

    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> Result<AttendanceRecord, AppError> {
        let mut state = self.state.write().await;
        let key = (record.class_id, record.athlete_id, record.session_date);
        let saved = match state.attendance.get(&key) {
            Some(existing) => AttendanceRecord {
                attendance_id: existing.attendance_id,
                ..record.clone()
            },
            None => record.clone(),
        };
        state.attendance.insert(key, saved.clone());
        Ok(saved)
    }

    async fn list_attendance(
        &self,
        class_id: Uuid,
        session_date: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let state = self.state.read().await;
        let mut records: Vec<AttendanceRecord> = state
            .attendance
            .values()
            .filter(|r| r.class_id == class_id && session_date.is_none_or(|d| r.session_date == d))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.session_date
                .cmp(&a.session_date)
                .then(a.athlete_id.cmp(&b.athlete_id))
        });
        Ok(records)
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn insert_billing_item(&self, item: &BillingItem) -> Result<BillingItem, AppError> {
        let mut state = self.state.write().await;
        state.billing_items.insert(item.billing_item_id, item.clone());
        Ok(item.clone())
    }

    async fn get_billing_item(
        &self,
        academy_id: Uuid,
        billing_item_id: Uuid,
    ) -> Result<Option<BillingItem>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .billing_items
            .get(&billing_item_id)
            .filter(|i| i.academy_id == academy_id)
            .cloned())
    }

    async fn list_billing_items(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<BillingItem>, AppError> {
        let state = self.state.read().await;
        let mut items: Vec<BillingItem> = state
            .billing_items
            .values()
            .filter(|i| i.academy_id == academy_id && (include_inactive || i.is_active))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn update_billing_item(&self, item: &BillingItem) -> Result<BillingItem, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .billing_items
            .get_mut(&item.billing_item_id)
            .filter(|i| i.academy_id == item.academy_id)
            .ok_or_else(|| not_found("Billing item"))?;
        *slot = item.clone();
        Ok(item.clone())
    }

    async fn delete_billing_item(
        &self,
        academy_id: Uuid,
        billing_item_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .billing_items
            .get(&billing_item_id)
            .is_some_and(|i| i.academy_id == academy_id);
        if !owned {
            return Ok(false);
        }
        if state
            .charges
            .values()
            .any(|c| c.billing_item_id == Some(billing_item_id))
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Billing item is referenced by charges; deactivate it instead"
            )));
        }
        state.billing_items.remove(&billing_item_id);
        for group in state.groups.values_mut() {
            if group.billing_item_id == Some(billing_item_id) {
                group.billing_item_id = None;
            }
        }
        Ok(true)
    }

    async fn insert_charge(&self, charge: &Charge) -> Result<Charge, AppError> {
        let mut state = self.state.write().await;
        state.charges.insert(charge.charge_id, charge.clone());
        Ok(charge.clone())
    }

    async fn get_charge(
        &self,
        academy_id: Uuid,
        charge_id: Uuid,
    ) -> Result<Option<Charge>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .charges
            .get(&charge_id)
            .filter(|c| c.academy_id == academy_id)
            .cloned())
    }

    async fn find_charge(&self, charge_id: Uuid) -> Result<Option<Charge>, AppError> {
        Ok(self.state.read().await.charges.get(&charge_id).cloned())
    }

    async fn list_charges(
        &self,
        academy_id: Uuid,
        filter: &ListChargesFilter,
    ) -> Result<(Vec<Charge>, i64), AppError> {
        let state = self.state.read().await;
        let mut charges: Vec<Charge> = state
            .charges
            .values()
            .filter(|c| c.academy_id == academy_id)
            .filter(|c| filter.period.as_deref().is_none_or(|p| c.period == p))
            .filter(|c| filter.status.is_none_or(|s| c.status == s.as_str()))
            .filter(|c| filter.athlete_id.is_none_or(|a| c.athlete_id == a))
            .filter(|c| filter.group_id.is_none_or(|g| c.group_id == Some(g)))
            .cloned()
            .collect();
        charges.sort_by(|a, b| {
            b.due_date
                .cmp(&a.due_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        Ok(page(charges, filter.limit, filter.offset))
    }

    async fn update_charge(&self, charge: &Charge) -> Result<Charge, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .charges
            .get_mut(&charge.charge_id)
            .filter(|c| c.academy_id == charge.academy_id)
            .ok_or_else(|| not_found("Charge"))?;
        *slot = charge.clone();
        Ok(charge.clone())
    }

    async fn delete_charge(&self, academy_id: Uuid, charge_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .charges
            .get(&charge_id)
            .is_some_and(|c| c.academy_id == academy_id);
        if owned {
            state.charges.remove(&charge_id);
        }
        Ok(owned)
    }

    async fn generation_candidates(
        &self,
        academy_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Vec<GenerationCandidate>, AppError> {
        let state = self.state.read().await;
        let mut candidates = Vec::new();

        for membership in state.memberships.values().filter(|m| m.is_active) {
            let Some(group) = state.groups.get(&membership.group_id) else {
                continue;
            };
            if group.academy_id != academy_id
                || !group.is_active
                || group_id.is_some_and(|g| g != group.group_id)
            {
                continue;
            }
            let Some(athlete) = state.athletes.get(&membership.athlete_id) else {
                continue;
            };
            if !athlete.is_active() {
                continue;
            }
            let item = group
                .billing_item_id
                .and_then(|id| state.billing_items.get(&id));

            candidates.push(GenerationCandidate {
                athlete_id: athlete.athlete_id,
                first_name: athlete.first_name.clone(),
                last_name: athlete.last_name.clone(),
                group_id: group.group_id,
                group_name: group.name.clone(),
                custom_fee_cents: membership.custom_fee_cents,
                group_fee_cents: group.monthly_fee_cents,
                billing_item_id: group.billing_item_id,
                item_amount_cents: item.map(|i| i.amount_cents),
                item_currency: item.map(|i| i.currency.clone()),
                item_is_active: item.map(|i| i.is_active),
            });
        }

        candidates.sort_by(|a, b| {
            (&a.group_name, &a.last_name, &a.first_name).cmp(&(
                &b.group_name,
                &b.last_name,
                &b.first_name,
            ))
        });
        Ok(candidates)
    }

    async fn list_period_charges(
        &self,
        academy_id: Uuid,
        period: &str,
    ) -> Result<Vec<Charge>, AppError> {
        let state = self.state.read().await;
        let mut charges: Vec<Charge> = state
            .charges
            .values()
            .filter(|c| c.academy_id == academy_id && c.period == period)
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.created_utc);
        Ok(charges)
    }

    async fn write_generated_charge(
        &self,
        charge: &Charge,
        overwrite_pending: bool,
    ) -> Result<GeneratedChargeWrite, AppError> {
        let mut state = self.state.write().await;
        let generated = ChargeOrigin::Generated.as_str();

        let existing = state.charges.values_mut().find(|c| {
            c.origin == generated
                && c.academy_id == charge.academy_id
                && c.athlete_id == charge.athlete_id
                && c.period == charge.period
                && c.group_id == charge.group_id
        });

        match existing {
            None => {
                state.charges.insert(charge.charge_id, charge.clone());
                Ok(GeneratedChargeWrite::Created(charge.clone()))
            }
            Some(existing)
                if overwrite_pending && existing.status == ChargeStatus::Pending.as_str() =>
            {
                existing.amount_cents = charge.amount_cents;
                existing.currency = charge.currency.clone();
                existing.due_date = charge.due_date;
                existing.description = charge.description.clone();
                existing.billing_item_id = charge.billing_item_id;
                existing.updated_utc = charge.updated_utc;
                Ok(GeneratedChargeWrite::Updated(existing.clone()))
            }
            Some(_) => Ok(GeneratedChargeWrite::Skipped),
        }
    }

    async fn list_open_charges_due_by(
        &self,
        academy_id: Uuid,
        until: NaiveDate,
    ) -> Result<Vec<Charge>, AppError> {
        let state = self.state.read().await;
        let mut charges: Vec<Charge> = state
            .charges
            .values()
            .filter(|c| c.academy_id == academy_id && c.due_date <= until)
            .filter(|c| c.status().is_ok_and(|s| s.is_open()))
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.due_date);
        Ok(charges)
    }

    async fn list_unpaid_past_due(&self, today: NaiveDate) -> Result<Vec<Charge>, AppError> {
        let state = self.state.read().await;
        let mut charges: Vec<Charge> = state
            .charges
            .values()
            .filter(|c| {
                (c.status == ChargeStatus::Pending.as_str()
                    || c.status == ChargeStatus::Partial.as_str())
                    && c.due_date < today
            })
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.due_date);
        Ok(charges)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get_subscription(&self, owner_id: Uuid) -> Result<Option<Subscription>, AppError> {
        Ok(self.state.read().await.subscriptions.get(&owner_id).cloned())
    }

    async fn find_subscription_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.processor_subscription_id.as_deref() == Some(processor_subscription_id))
            .cloned())
    }

    async fn find_subscription_by_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.processor_customer_id.as_deref() == Some(processor_customer_id))
            .cloned())
    }

    async fn upsert_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, AppError> {
        let mut state = self.state.write().await;
        let saved = match state.subscriptions.get(&subscription.owner_id) {
            Some(existing) => Subscription {
                subscription_id: existing.subscription_id,
                created_utc: existing.created_utc,
                ..subscription.clone()
            },
            None => subscription.clone(),
        };
        state.subscriptions.insert(saved.owner_id, saved.clone());
        Ok(saved)
    }

    async fn upsert_processor_invoice(
        &self,
        invoice: &ProcessorInvoice,
    ) -> Result<ProcessorInvoice, AppError> {
        let mut state = self.state.write().await;
        let saved = match state.invoices.get(&invoice.processor_invoice_id) {
            Some(existing) => ProcessorInvoice {
                invoice_id: existing.invoice_id,
                owner_id: existing.owner_id,
                created_utc: existing.created_utc,
                ..invoice.clone()
            },
            None => invoice.clone(),
        };
        state
            .invoices
            .insert(saved.processor_invoice_id.clone(), saved.clone());
        Ok(saved)
    }

    async fn list_processor_invoices(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ProcessorInvoice>, AppError> {
        let state = self.state.read().await;
        let mut invoices: Vec<ProcessorInvoice> = state
            .invoices
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(invoices)
    }

    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<Notification, AppError> {
        let mut state = self.state.write().await;
        state.notifications.push(notification.clone());
        Ok(notification.clone())
    }

    async fn list_notifications(
        &self,
        owner_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, AppError> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.owner_id == owner_id && (!unread_only || n.read_utc.is_none()))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        owner_id: Uuid,
        notification_id: Uuid,
        read_utc: DateTime<Utc>,
    ) -> Result<Option<Notification>, AppError> {
        let mut state = self.state.write().await;
        Ok(state
            .notifications
            .iter_mut()
            .find(|n| n.owner_id == owner_id && n.notification_id == notification_id)
            .map(|n| {
                n.read_utc.get_or_insert(read_utc);
                n.clone()
            }))
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    async fn enqueue_email(&self, email: &EmailLog) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if let Some(key) = &email.dedupe_key {
            if state
                .emails
                .iter()
                .any(|e| e.dedupe_key.as_ref() == Some(key))
            {
                return Ok(false);
            }
        }
        state.emails.push(email.clone());
        Ok(true)
    }

    async fn due_emails(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<EmailLog>, AppError> {
        let state = self.state.read().await;
        let mut due: Vec<EmailLog> = state
            .emails
            .iter()
            .filter(|e| e.status == EmailStatus::Pending.as_str() && e.next_attempt_utc <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_attempt_utc);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn update_email(&self, email: &EmailLog) -> Result<EmailLog, AppError> {
        let mut state = self.state.write().await;
        let slot = state
            .emails
            .iter_mut()
            .find(|e| e.email_id == email.email_id)
            .ok_or_else(|| not_found("Email"))?;
        *slot = email.clone();
        Ok(email.clone())
    }

    async fn list_emails(&self, academy_id: Option<Uuid>) -> Result<Vec<EmailLog>, AppError> {
        let state = self.state.read().await;
        let mut emails: Vec<EmailLog> = state
            .emails
            .iter()
            .filter(|e| academy_id.is_none_or(|a| e.academy_id == Some(a)))
            .cloned()
            .collect();
        emails.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(emails)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn academy(slug: &str) -> Academy {
        let now = Utc::now();
        Academy {
            academy_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: slug.to_string(),
            slug: slug.to_string(),
            city: None,
            country: None,
            description: None,
            contact_email: None,
            currency: "EUR".to_string(),
            is_public: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_academy(&academy("norte")).await.unwrap();

        let err = store.insert_academy(&academy("norte")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn dedupe_key_blocks_second_enqueue() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let key = Some("reminder:due:abc".to_string());
        let first = EmailLog::pending(None, "a@example.com", "s", "b", "reminder", key.clone(), now);
        let second = EmailLog::pending(None, "a@example.com", "s", "b", "reminder", key, now);

        assert!(store.enqueue_email(&first).await.unwrap());
        assert!(!store.enqueue_email(&second).await.unwrap());
        assert_eq!(store.list_emails(None).await.unwrap().len(), 1);
    }
}
