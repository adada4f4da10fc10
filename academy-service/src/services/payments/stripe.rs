//! Stripe client for Checkout Sessions and the Billing Portal.
//!
//! Stripe takes form-encoded bodies with bracketed keys for nested fields
//! and authenticates with the secret key as a bearer token.

use super::{CheckoutItem, CheckoutRequest, CheckoutSession, PaymentError, PaymentProcessor};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: Secret<String>,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortalResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: Secret<String>, api_base_url: impl Into<String>) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| PaymentError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret_key,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.api_base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, path = %path, "Stripe response");

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| PaymentError::InvalidResponse(e.to_string()))
        } else {
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .map(|b| {
                    format!(
                        "{}: {}",
                        b.error.error_type.unwrap_or_else(|| "api_error".to_string()),
                        b.error.message.unwrap_or_default()
                    )
                })
                .unwrap_or(body);
            tracing::error!(status = %status, path = %path, message = %message, "Stripe request failed");
            Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Flatten a checkout request into Stripe's form parameters.
fn checkout_params(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
    ];

    match &request.item {
        CheckoutItem::Price { price_id } => {
            params.push(("line_items[0][price]".to_string(), price_id.clone()));
        }
        CheckoutItem::Amount {
            amount_cents,
            currency,
            name,
        } => {
            params.push((
                "line_items[0][price_data][currency]".to_string(),
                currency.to_lowercase(),
            ));
            params.push((
                "line_items[0][price_data][unit_amount]".to_string(),
                amount_cents.to_string(),
            ));
            params.push((
                "line_items[0][price_data][product_data][name]".to_string(),
                name.clone(),
            ));
        }
    }

    match (&request.customer_id, &request.customer_email) {
        (Some(customer), _) => params.push(("customer".to_string(), customer.clone())),
        (None, Some(email)) => params.push(("customer_email".to_string(), email.clone())),
        (None, None) => {}
    }

    for (key, value) in &request.metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
        if request.mode == super::CheckoutMode::Subscription {
            params.push((format!("subscription_data[metadata][{}]", key), value.clone()));
        }
    }

    params
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let session: SessionResponse = self
            .post_form("/v1/checkout/sessions", &checkout_params(request))
            .await?;

        let url = session.url.ok_or_else(|| {
            PaymentError::InvalidResponse("checkout session has no url".to_string())
        })?;

        tracing::info!(session_id = %session.id, mode = request.mode.as_str(), "Stripe checkout session created");

        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, PaymentError> {
        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        let portal: PortalResponse = self
            .post_form("/v1/billing_portal/sessions", &params)
            .await?;
        Ok(portal.url)
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payments::CheckoutMode;
    use std::collections::BTreeMap;

    fn find<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn one_off_payment_uses_price_data() {
        let mut metadata = BTreeMap::new();
        metadata.insert("charge_id".to_string(), "c-1".to_string());
        let request = CheckoutRequest {
            mode: CheckoutMode::Payment,
            item: CheckoutItem::Amount {
                amount_cents: 5000,
                currency: "EUR".to_string(),
                name: "Juniors – March 2026".to_string(),
            },
            customer_id: None,
            customer_email: Some("parent@example.com".to_string()),
            success_url: "https://app/ok".to_string(),
            cancel_url: "https://app/cancel".to_string(),
            metadata,
        };

        let params = checkout_params(&request);
        assert_eq!(find(&params, "mode"), Some("payment"));
        assert_eq!(find(&params, "line_items[0][price_data][currency]"), Some("eur"));
        assert_eq!(find(&params, "line_items[0][price_data][unit_amount]"), Some("5000"));
        assert_eq!(find(&params, "customer_email"), Some("parent@example.com"));
        assert_eq!(find(&params, "metadata[charge_id]"), Some("c-1"));
        assert_eq!(find(&params, "subscription_data[metadata][charge_id]"), None);
    }

    #[test]
    fn subscription_copies_metadata_to_subscription() {
        let mut metadata = BTreeMap::new();
        metadata.insert("plan_code".to_string(), "pro".to_string());
        let request = CheckoutRequest {
            mode: CheckoutMode::Subscription,
            item: CheckoutItem::Price {
                price_id: "price_pro".to_string(),
            },
            customer_id: Some("cus_1".to_string()),
            customer_email: Some("owner@example.com".to_string()),
            success_url: "https://app/ok".to_string(),
            cancel_url: "https://app/cancel".to_string(),
            metadata,
        };

        let params = checkout_params(&request);
        assert_eq!(find(&params, "line_items[0][price]"), Some("price_pro"));
        assert_eq!(find(&params, "customer"), Some("cus_1"));
        assert_eq!(find(&params, "customer_email"), None);
        assert_eq!(find(&params, "subscription_data[metadata][plan_code]"), Some("pro"));
    }
}
