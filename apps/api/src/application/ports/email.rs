use async_trait::async_trait;

use crate::app_error::AppResult;

/// Outbound transactional mail (OTP codes).
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()>;
}
