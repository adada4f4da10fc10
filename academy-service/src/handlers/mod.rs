pub mod academies;
pub mod athletes;
pub mod billing_items;
pub mod charges;
pub mod classes;
pub mod directory;
pub mod groups;
pub mod guardians;
pub mod health;
pub mod subscription;
pub mod webhooks;

pub use health::{health_check, metrics_endpoint, readiness_check};
