use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProcessor};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Processor used when no secret key is configured.
pub struct MockPaymentProcessor {
    session_count: AtomicU64,
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self {
            session_count: AtomicU64::new(0),
        }
    }

    pub fn session_count(&self) -> u64 {
        self.session_count.load(Ordering::SeqCst)
    }
}

impl Default for MockPaymentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let count = self.session_count.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_mock_{}", count);

        tracing::info!(
            session_id = %session_id,
            mode = request.mode.as_str(),
            "[MOCK] Checkout session created"
        );

        Ok(CheckoutSession {
            url: format!("https://checkout.mock.local/{}", session_id),
            session_id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<String, PaymentError> {
        Ok(format!("https://billing.mock.local/{}", customer_id))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
