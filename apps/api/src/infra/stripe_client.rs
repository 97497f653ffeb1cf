use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    application::password::constant_time_eq,
    infra::http_client::build_client,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook payload, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: build_client(),
            secret_key,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    fn post(&self, path: &str, idempotency_key: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .post(format!("{}/{}", STRIPE_API_BASE, path))
            .header("Authorization", self.auth_header());
        match idempotency_key {
            Some(key) => builder.header("Idempotency-Key", key),
            None => builder,
        }
    }

    // ========================================================================
    // Products
    // ========================================================================

    pub async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<StripeProduct> {
        let mut params: Vec<(&str, String)> = vec![("name", name.to_string())];
        if let Some(desc) = description {
            params.push(("description", desc.to_string()));
        }

        let response = self
            .post("products", None)
            .form(&params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    pub async fn update_product(
        &self,
        product_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<StripeProduct> {
        let params: Vec<(&str, String)> = vec![
            ("name", name.to_string()),
            // An empty value unsets the field upstream.
            ("description", description.unwrap_or_default().to_string()),
        ];

        let response = self
            .post(&format!("products/{}", product_id), None)
            .form(&params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Prices
    // ========================================================================

    pub async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        currency: &str,
        interval: &str,
    ) -> AppResult<StripePrice> {
        let params: Vec<(&str, String)> = vec![
            ("product", product_id.to_string()),
            ("unit_amount", unit_amount.to_string()),
            ("currency", currency.to_lowercase()),
            ("recurring[interval]", interval.to_string()),
            ("recurring[interval_count]", "1".to_string()),
        ];

        let response = self
            .post("prices", None)
            .form(&params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Customers
    // ========================================================================

    pub async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: &str,
        idempotency_key: &str,
    ) -> AppResult<StripeCustomer> {
        let params: Vec<(&str, String)> = vec![
            ("email", email.to_string()),
            ("name", name.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];

        let response = self
            .post("customers", Some(idempotency_key))
            .form(&params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    pub async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> AppResult<StripePaymentMethod> {
        let response = self
            .post(&format!("payment_methods/{}/attach", payment_method_id), None)
            .form(&[("customer", customer_id)])
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    pub async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> AppResult<StripeCustomer> {
        let response = self
            .post(&format!("customers/{}", customer_id), None)
            .form(&[(
                "invoice_settings[default_payment_method]",
                payment_method_id,
            )])
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Create a subscription whose first invoice waits for client confirmation.
    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        idempotency_key: &str,
    ) -> AppResult<StripeSubscription> {
        let params: Vec<(&str, String)> = vec![
            ("customer", customer_id.to_string()),
            ("items[0][price]", price_id.to_string()),
            ("payment_behavior", "default_incomplete".to_string()),
            (
                "payment_settings[save_default_payment_method]",
                "on_subscription".to_string(),
            ),
            ("expand[]", "latest_invoice.payment_intent".to_string()),
        ];

        let response = self
            .post("subscriptions", Some(idempotency_key))
            .form(&params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    pub async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        let response = self
            .client
            .delete(format!(
                "{}/subscriptions/{}",
                STRIPE_API_BASE, subscription_id
            ))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        client_reference_id: &str,
    ) -> AppResult<StripeCheckoutSession> {
        let params: Vec<(&str, String)> = vec![
            ("customer", customer_id.to_string()),
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", success_url.to_string()),
            ("cancel_url", cancel_url.to_string()),
            ("client_reference_id", client_reference_id.to_string()),
            ("metadata[payment_id]", client_reference_id.to_string()),
        ];

        let response = self
            .post(
                "checkout/sessions",
                Some(&format!("checkout-{}", client_reference_id)),
            )
            .form(&params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    /// Check a `stripe-signature` header (`t=<unix>,v1=<hex>,...`) against the raw body.
    ///
    /// Any `v1` entry may match. The timestamp must lie within `tolerance_secs` of `now`.
    pub fn verify_webhook_signature(
        payload: &[u8],
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
        now: i64,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| AppError::InvalidInput("Missing timestamp in signature".into()))?;
        if signatures.is_empty() {
            return Err(AppError::InvalidInput("Missing signature".into()));
        }
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::InvalidInput("Invalid timestamp".into()))?;

        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures
            .iter()
            .any(|sig| constant_time_eq(sig, &expected))
        {
            return Err(AppError::InvalidInput("Invalid signature".into()));
        }
        if (now - ts).abs() > tolerance_secs {
            return Err(AppError::InvalidInput("Timestamp outside tolerance".into()));
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            // Card and request errors are the caller's to fix; the rest are ours.
            if status.is_client_error() {
                if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                    return Err(AppError::InvalidInput(format!(
                        "Stripe error: {}",
                        error.error.message.unwrap_or(error.error.error_type)
                    )));
                }
            }

            return Err(AppError::Internal(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn request_failed(e: reqwest::Error) -> AppError {
    AppError::Internal(format!("Stripe request failed: {}", e))
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeProduct {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub unit_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub latest_invoice: Option<StripeExpandedInvoice>,
}

impl StripeSubscription {
    pub fn payment_intent(&self) -> Option<&StripePaymentIntent> {
        self.latest_invoice
            .as_ref()
            .and_then(|invoice| invoice.payment_intent.as_ref())
    }
}

/// `latest_invoice` as returned with `expand[]=latest_invoice.payment_intent`.
#[derive(Debug, Deserialize)]
pub struct StripeExpandedInvoice {
    pub id: String,
    pub payment_intent: Option<StripePaymentIntent>,
}

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
}
