pub mod charge_generator;
pub mod charges;
pub mod email;
pub mod metrics;
pub mod payments;
pub mod plan_limits;
pub mod reminders;
pub mod store;

pub use store::{MemoryStore, PgStore, Store};
