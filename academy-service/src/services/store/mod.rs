//! Persistence traits and their Postgres and in-memory implementations.
//!
//! Handlers and services depend on `Arc<dyn Store>` only. Inserts and
//! updates take fully built rows; `update_*` writes every mutable column.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    Academy, Athlete, AttendanceRecord, BillingItem, Charge, Class, DirectoryFilter, EmailLog,
    GeneratedChargeWrite, GenerationCandidate, Group, GroupMembership, Guardian,
    ListAthletesFilter, ListChargesFilter, Notification, PlanUsage, ProcessorInvoice,
    Subscription,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait AcademyStore: Send + Sync {
    /// Fails with `Conflict` when the slug is taken.
    async fn insert_academy(&self, academy: &Academy) -> Result<Academy, AppError>;
    async fn get_academy(&self, academy_id: Uuid) -> Result<Option<Academy>, AppError>;
    async fn get_academy_by_slug(&self, slug: &str) -> Result<Option<Academy>, AppError>;
    async fn list_owned_academies(&self, owner_id: Uuid) -> Result<Vec<Academy>, AppError>;
    async fn list_all_academies(&self) -> Result<Vec<Academy>, AppError>;
    async fn update_academy(&self, academy: &Academy) -> Result<Academy, AppError>;
    /// Public academies matching the filter, plus the total match count.
    async fn list_public_academies(
        &self,
        filter: &DirectoryFilter,
    ) -> Result<(Vec<Academy>, i64), AppError>;
    /// Resource counts across every academy the owner has.
    async fn usage_for_owner(&self, owner_id: Uuid) -> Result<PlanUsage, AppError>;
}

#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn insert_athlete(&self, athlete: &Athlete) -> Result<Athlete, AppError>;
    async fn get_athlete(&self, academy_id: Uuid, athlete_id: Uuid)
        -> Result<Option<Athlete>, AppError>;
    async fn list_athletes(
        &self,
        academy_id: Uuid,
        filter: &ListAthletesFilter,
    ) -> Result<(Vec<Athlete>, i64), AppError>;
    async fn update_athlete(&self, athlete: &Athlete) -> Result<Athlete, AppError>;

    async fn insert_guardian(&self, guardian: &Guardian) -> Result<Guardian, AppError>;
    async fn get_guardian(
        &self,
        academy_id: Uuid,
        guardian_id: Uuid,
    ) -> Result<Option<Guardian>, AppError>;
    async fn list_guardians(
        &self,
        academy_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Guardian>, i64), AppError>;
    async fn update_guardian(&self, guardian: &Guardian) -> Result<Guardian, AppError>;
    /// Deletes the guardian and its athlete links.
    async fn delete_guardian(&self, academy_id: Uuid, guardian_id: Uuid) -> Result<bool, AppError>;
    /// Idempotent.
    async fn link_guardian(&self, athlete_id: Uuid, guardian_id: Uuid) -> Result<(), AppError>;
    async fn unlink_guardian(&self, athlete_id: Uuid, guardian_id: Uuid) -> Result<bool, AppError>;
    async fn list_athlete_guardians(&self, athlete_id: Uuid) -> Result<Vec<Guardian>, AppError>;

    async fn insert_group(&self, group: &Group) -> Result<Group, AppError>;
    async fn get_group(&self, academy_id: Uuid, group_id: Uuid) -> Result<Option<Group>, AppError>;
    async fn list_groups(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Group>, AppError>;
    async fn update_group(&self, group: &Group) -> Result<Group, AppError>;
    /// Insert or replace the membership of an athlete in a group.
    async fn upsert_membership(
        &self,
        membership: &GroupMembership,
    ) -> Result<GroupMembership, AppError>;
    async fn get_membership(
        &self,
        group_id: Uuid,
        athlete_id: Uuid,
    ) -> Result<Option<GroupMembership>, AppError>;
    async fn list_memberships(&self, group_id: Uuid) -> Result<Vec<GroupMembership>, AppError>;
    async fn delete_membership(&self, group_id: Uuid, athlete_id: Uuid) -> Result<bool, AppError>;

    async fn insert_class(&self, class: &Class) -> Result<Class, AppError>;
    async fn get_class(&self, academy_id: Uuid, class_id: Uuid) -> Result<Option<Class>, AppError>;
    async fn list_classes(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Class>, AppError>;
    async fn update_class(&self, class: &Class) -> Result<Class, AppError>;
    /// Insert, or replace the status of, the record for (class, athlete, date).
    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> Result<AttendanceRecord, AppError>;
    async fn list_attendance(
        &self,
        class_id: Uuid,
        session_date: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, AppError>;
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn insert_billing_item(&self, item: &BillingItem) -> Result<BillingItem, AppError>;
    async fn get_billing_item(
        &self,
        academy_id: Uuid,
        billing_item_id: Uuid,
    ) -> Result<Option<BillingItem>, AppError>;
    async fn list_billing_items(
        &self,
        academy_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<BillingItem>, AppError>;
    async fn update_billing_item(&self, item: &BillingItem) -> Result<BillingItem, AppError>;
    /// Fails with `Conflict` while any charge references the item.
    async fn delete_billing_item(
        &self,
        academy_id: Uuid,
        billing_item_id: Uuid,
    ) -> Result<bool, AppError>;

    async fn insert_charge(&self, charge: &Charge) -> Result<Charge, AppError>;
    async fn get_charge(&self, academy_id: Uuid, charge_id: Uuid)
        -> Result<Option<Charge>, AppError>;
    /// Lookup without academy scope, for processor callbacks.
    async fn find_charge(&self, charge_id: Uuid) -> Result<Option<Charge>, AppError>;
    async fn list_charges(
        &self,
        academy_id: Uuid,
        filter: &ListChargesFilter,
    ) -> Result<(Vec<Charge>, i64), AppError>;
    async fn update_charge(&self, charge: &Charge) -> Result<Charge, AppError>;
    async fn delete_charge(&self, academy_id: Uuid, charge_id: Uuid) -> Result<bool, AppError>;

    /// Active memberships of active athletes in active groups.
    async fn generation_candidates(
        &self,
        academy_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Vec<GenerationCandidate>, AppError>;
    /// Write one generated charge under the (academy, athlete, period, group)
    /// uniqueness rule. With `overwrite_pending` an existing pending charge
    /// is refreshed; anything else already present is left alone.
    /// Every charge of an academy for one period, any origin or status.
    async fn list_period_charges(
        &self,
        academy_id: Uuid,
        period: &str,
    ) -> Result<Vec<Charge>, AppError>;
    async fn write_generated_charge(
        &self,
        charge: &Charge,
        overwrite_pending: bool,
    ) -> Result<GeneratedChargeWrite, AppError>;

    /// Open (pending, partial, overdue) charges of an academy due on or before `until`.
    async fn list_open_charges_due_by(
        &self,
        academy_id: Uuid,
        until: NaiveDate,
    ) -> Result<Vec<Charge>, AppError>;
    /// Pending or partial charges, across academies, due strictly before `today`.
    async fn list_unpaid_past_due(&self, today: NaiveDate) -> Result<Vec<Charge>, AppError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_subscription(&self, owner_id: Uuid) -> Result<Option<Subscription>, AppError>;
    async fn find_subscription_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, AppError>;
    async fn find_subscription_by_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<Subscription>, AppError>;
    /// Insert or replace the owner's subscription.
    async fn upsert_subscription(&self, subscription: &Subscription)
        -> Result<Subscription, AppError>;

    async fn upsert_processor_invoice(
        &self,
        invoice: &ProcessorInvoice,
    ) -> Result<ProcessorInvoice, AppError>;
    async fn list_processor_invoices(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ProcessorInvoice>, AppError>;

    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<Notification, AppError>;
    async fn list_notifications(
        &self,
        owner_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, AppError>;
    async fn mark_notification_read(
        &self,
        owner_id: Uuid,
        notification_id: Uuid,
        read_utc: DateTime<Utc>,
    ) -> Result<Option<Notification>, AppError>;
}

#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Returns false when a row with the same dedupe key already exists.
    async fn enqueue_email(&self, email: &EmailLog) -> Result<bool, AppError>;
    /// Pending rows whose next attempt is due, oldest first.
    async fn due_emails(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<EmailLog>, AppError>;
    async fn update_email(&self, email: &EmailLog) -> Result<EmailLog, AppError>;
    async fn list_emails(&self, academy_id: Option<Uuid>) -> Result<Vec<EmailLog>, AppError>;
}

/// Everything the service persists.
#[async_trait]
pub trait Store: AcademyStore + RosterStore + BillingStore + SubscriptionStore + EmailStore {
    async fn health_check(&self) -> Result<(), AppError>;
    fn backend_name(&self) -> &'static str;
}
