//! Payment processor webhooks: signature verification and event handling.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex>` where the
//! hex digest is HMAC-SHA256 over `"{t}.{raw body}"` keyed with the webhook
//! secret.

use crate::models::{
    ChargeStatus, PlanCode, ProcessorInvoice, StatusChange, Subscription, SubscriptionStatus,
};
use crate::services::charges::transition_charge;
use crate::services::store::Store;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use service_core::error::AppError;
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Maximum accepted age of a signed timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("signature timestamp outside tolerance ({age_secs}s)")]
    Expired { age_secs: u64 },

    #[error("webhook secret is not configured")]
    NoSecret,
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::Unauthorized(anyhow::Error::new(err))
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &str) -> Result<HmacSha256, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::NoSecret);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::NoSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Build a signature header value for `payload`, as the processor would.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> Result<String, SignatureError> {
    let digest = mac_for(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

/// Check a signature header against the raw body.
pub fn verify_signature(
    header: &str,
    payload: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?)
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let age_secs = now
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .unwrap_or(u64::MAX);
    if age_secs > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired { age_secs });
    }

    let mac = mac_for(secret, timestamp, payload)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<String>,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: String,
    customer: Option<String>,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    amount_due: i64,
    currency: String,
    status: Option<String>,
    hosted_invoice_url: Option<String>,
    period_end: Option<i64>,
}

/// What handling an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Ignored => "ignored",
        }
    }
}

fn parse_object<T: for<'de> Deserialize<'de>>(event: &WebhookEvent) -> Result<T, AppError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!(
            "Invalid {} payload: {}",
            event.event_type,
            e
        ))
    })
}

fn from_unix(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

/// Apply a verified event. Unknown event types are ignored.
#[instrument(skip(store, event), fields(event_id = %event.id, event_type = %event.event_type))]
pub async fn apply_event(
    store: &dyn Store,
    event: &WebhookEvent,
    now: DateTime<Utc>,
) -> Result<EventOutcome, AppError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = parse_object(event)?;
            checkout_completed(store, session, now).await
        }
        "customer.subscription.updated" => {
            let object: SubscriptionObject = parse_object(event)?;
            subscription_updated(store, object, now).await
        }
        "customer.subscription.deleted" => {
            let object: SubscriptionObject = parse_object(event)?;
            subscription_deleted(store, object, now).await
        }
        "invoice.paid" | "invoice.payment_failed" => {
            let invoice: InvoiceObject = parse_object(event)?;
            let failed = event.event_type == "invoice.payment_failed";
            invoice_event(store, invoice, failed, now).await
        }
        other => {
            info!(event_type = %other, "Unhandled webhook event type");
            Ok(EventOutcome::Ignored)
        }
    }
}

async fn checkout_completed(
    store: &dyn Store,
    session: CheckoutSessionObject,
    now: DateTime<Utc>,
) -> Result<EventOutcome, AppError> {
    let mut outcome = EventOutcome::Ignored;

    if let Some(charge_id) = session.metadata.get("charge_id") {
        let charge_id = Uuid::parse_str(charge_id)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid charge_id metadata")))?;
        match store.find_charge(charge_id).await? {
            Some(charge) if charge.status == ChargeStatus::Paid.as_str() => {
                info!(charge_id = %charge_id, "Charge already paid");
            }
            Some(charge) => {
                match transition_charge(store, charge, StatusChange::paid("card", Some(now)), "webhook", now)
                    .await
                {
                    Ok(_) => outcome = EventOutcome::Applied,
                    Err(AppError::BadRequest(e)) => {
                        warn!(charge_id = %charge_id, error = %e, "Paid checkout for a charge that cannot be paid")
                    }
                    Err(e) => return Err(e),
                }
            }
            None => warn!(charge_id = %charge_id, session_id = %session.id, "Checkout for unknown charge"),
        }
    }

    let owner_id = session
        .metadata
        .get("owner_id")
        .and_then(|id| Uuid::parse_str(id).ok());
    let plan = session
        .metadata
        .get("plan_code")
        .and_then(|code| code.parse::<PlanCode>().ok());

    if let (Some(owner_id), Some(plan)) = (owner_id, plan) {
        let mut subscription = store
            .get_subscription(owner_id)
            .await?
            .unwrap_or_else(|| Subscription::implicit_free(owner_id, now));
        subscription.plan_code = plan.as_str().to_string();
        subscription.status = SubscriptionStatus::Active.as_str().to_string();
        subscription.processor_customer_id = session.customer.or(subscription.processor_customer_id);
        subscription.processor_subscription_id =
            session.subscription.or(subscription.processor_subscription_id);
        subscription.updated_utc = now;
        store.upsert_subscription(&subscription).await?;
        info!(owner_id = %owner_id, plan_code = %plan, "Subscription activated from checkout");
        outcome = EventOutcome::Applied;
    }

    Ok(outcome)
}

async fn find_subscription(
    store: &dyn Store,
    processor_subscription_id: &str,
    customer: Option<&str>,
) -> Result<Option<Subscription>, AppError> {
    if let Some(found) = store
        .find_subscription_by_processor_id(processor_subscription_id)
        .await?
    {
        return Ok(Some(found));
    }
    match customer {
        Some(customer) => store.find_subscription_by_customer(customer).await,
        None => Ok(None),
    }
}

async fn subscription_updated(
    store: &dyn Store,
    object: SubscriptionObject,
    now: DateTime<Utc>,
) -> Result<EventOutcome, AppError> {
    let Some(mut subscription) =
        find_subscription(store, &object.id, object.customer.as_deref()).await?
    else {
        warn!(processor_subscription_id = %object.id, "Update for unknown subscription");
        return Ok(EventOutcome::Ignored);
    };

    subscription.status = SubscriptionStatus::from_processor(&object.status)
        .as_str()
        .to_string();
    if let Some(plan) = object
        .metadata
        .get("plan_code")
        .and_then(|code| code.parse::<PlanCode>().ok())
    {
        subscription.plan_code = plan.as_str().to_string();
    }
    subscription.processor_subscription_id = Some(object.id);
    subscription.current_period_end = from_unix(object.current_period_end);
    subscription.cancel_at_period_end = object.cancel_at_period_end;
    subscription.updated_utc = now;
    store.upsert_subscription(&subscription).await?;
    Ok(EventOutcome::Applied)
}

async fn subscription_deleted(
    store: &dyn Store,
    object: SubscriptionObject,
    now: DateTime<Utc>,
) -> Result<EventOutcome, AppError> {
    let Some(mut subscription) =
        find_subscription(store, &object.id, object.customer.as_deref()).await?
    else {
        warn!(processor_subscription_id = %object.id, "Deletion of unknown subscription");
        return Ok(EventOutcome::Ignored);
    };

    subscription.status = SubscriptionStatus::Cancelled.as_str().to_string();
    subscription.plan_code = PlanCode::Free.as_str().to_string();
    subscription.cancel_at_period_end = false;
    subscription.updated_utc = now;
    store.upsert_subscription(&subscription).await?;
    info!(owner_id = %subscription.owner_id, "Subscription cancelled, owner back on free plan");
    Ok(EventOutcome::Applied)
}

async fn invoice_event(
    store: &dyn Store,
    invoice: InvoiceObject,
    failed: bool,
    now: DateTime<Utc>,
) -> Result<EventOutcome, AppError> {
    let subscription = match invoice.customer.as_deref() {
        Some(customer) => store.find_subscription_by_customer(customer).await?,
        None => None,
    };
    let Some(mut subscription) = subscription else {
        warn!(processor_invoice_id = %invoice.id, "Invoice for unknown customer");
        return Ok(EventOutcome::Ignored);
    };

    let status = match (failed, invoice.status) {
        (true, _) => "payment_failed".to_string(),
        (false, Some(status)) => status,
        (false, None) => "paid".to_string(),
    };

    store
        .upsert_processor_invoice(&ProcessorInvoice {
            invoice_id: Uuid::new_v4(),
            owner_id: subscription.owner_id,
            processor_invoice_id: invoice.id,
            amount_cents: if failed {
                invoice.amount_due
            } else {
                invoice.amount_paid
            },
            currency: invoice.currency.to_uppercase(),
            status,
            hosted_invoice_url: invoice.hosted_invoice_url,
            period_end: from_unix(invoice.period_end),
            created_utc: now,
        })
        .await?;

    if failed {
        subscription.status = SubscriptionStatus::PastDue.as_str().to_string();
        subscription.updated_utc = now;
        store.upsert_subscription(&subscription).await?;
        warn!(owner_id = %subscription.owner_id, "Subscription payment failed");
    }

    Ok(EventOutcome::Applied)
}
