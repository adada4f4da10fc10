use crate::models::{PlanCode, PlanLimits, PlanUsage, PlanViolation, Subscription};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Subscription,
    pub limits: PlanLimits,
    pub usage: PlanUsage,
    /// Non-empty after a forced downgrade until usage is reduced.
    pub violations: Vec<PlanViolation>,
}

#[derive(Debug, Deserialize)]
pub struct PlanChangeRequest {
    pub plan_code: PlanCode,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanChangeResponse {
    pub applied: bool,
    pub plan_code: PlanCode,
    pub violations: Vec<PlanViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCheckoutRequest {
    pub plan_code: PlanCode,
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread_only: bool,
}
