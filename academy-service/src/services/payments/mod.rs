//! Payment processor abstraction: hosted checkout, billing portal and webhooks.

mod mock;
mod stripe;
pub mod webhook;

pub use mock::MockPaymentProcessor;
pub use stripe::StripeClient;

use async_trait::async_trait;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment processing not configured: {0}")]
    NotConfigured(String),

    #[error("Request to payment processor failed: {0}")]
    Request(String),

    #[error("Payment processor returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment processor response: {0}")]
    InvalidResponse(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured(_) => AppError::BadRequest(anyhow::Error::new(err)),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    /// One-off payment of a charge.
    Payment,
    /// Recurring plan subscription.
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

/// What a hosted checkout page should collect.
#[derive(Debug, Clone)]
pub enum CheckoutItem {
    /// A recurring price configured at the processor.
    Price { price_id: String },
    /// An ad-hoc amount.
    Amount {
        amount_cents: i64,
        currency: String,
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub mode: CheckoutMode,
    pub item: CheckoutItem,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Echoed back on the webhook event.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Self-service billing portal for an existing processor customer.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, PaymentError>;

    fn name(&self) -> &'static str;
}
