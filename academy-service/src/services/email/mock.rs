use super::{EmailMessage, EmailProvider, ProviderError, ProviderResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Mock email provider for local runs and tests.
pub struct MockEmailProvider {
    failing: AtomicBool,
    send_count: AtomicU64,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            send_count: AtomicU64::new(0),
        }
    }

    /// Make every subsequent send fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

impl Default for MockEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &EmailMessage) -> Result<ProviderResponse, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::SendFailed(
                "Mock email provider set to fail".to_string(),
            ));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "[MOCK] Email would be sent"
        );

        Ok(ProviderResponse::success(Some(format!("mock-email-{}", count))))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
