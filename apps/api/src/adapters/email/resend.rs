use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::email::EmailSender,
    infra::http_client,
};

const RESEND_EMAILS_URL: &str = "https://api.resend.com/emails";

/// Sends transactional mail through Resend.
#[derive(Clone)]
pub struct ResendEmailSender {
    client: Client,
    api_key: SecretString,
    from: String,
}

impl ResendEmailSender {
    pub fn new(api_key: SecretString, from: String) -> Self {
        Self {
            client: http_client::build_client(),
            api_key,
            from,
        }
    }
}

#[derive(Serialize)]
struct ResendReq<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    #[instrument(skip(self, html))]
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        let body = ResendReq {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        self.client
            .post(RESEND_EMAILS_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send email: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Email API error: {e}")))?;

        Ok(())
    }
}
