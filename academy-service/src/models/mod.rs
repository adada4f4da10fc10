//! Domain models for academy-service.

mod academy;
mod athlete;
mod billing_item;
mod charge;
mod class;
mod email;
mod group;
mod period;
mod plan;
mod subscription;

pub use academy::{slugify, Academy, DirectoryFilter};
pub use athlete::{Athlete, AthleteStatus, Guardian, ListAthletesFilter};
pub use billing_item::{BillingItem, Periodicity};
pub use charge::{
    Charge, ChargeOrigin, ChargeStatus, ChargeTransitionError, GeneratedChargeWrite,
    ListChargesFilter, StatusChange,
};
pub use class::{AttendanceRecord, AttendanceStatus, Class};
pub use email::{EmailLog, EmailStatus};
pub use group::{GenerationCandidate, Group, GroupMembership};
pub use period::{BillingPeriod, InvalidPeriod};
pub use plan::{PlanCode, PlanLimits, PlanResource, PlanUsage, PlanViolation};
pub use subscription::{Notification, ProcessorInvoice, Subscription, SubscriptionStatus};
