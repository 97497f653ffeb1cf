use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::AppResult;

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Unique identifier for a customer in a payment provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription in a payment provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a billing customer is created for.
#[derive(Debug, Clone)]
pub struct CustomerRequest {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

/// Recurring price to create on a mirrored product.
#[derive(Debug, Clone)]
pub struct PriceRequest<'a> {
    pub product_id: &'a str,
    pub unit_amount_cents: i64,
    pub currency: &'a str,
    /// `month` or `year`
    pub interval: &'a str,
}

/// Result of creating a subscription against a stored payment method
#[derive(Debug, Clone)]
pub struct CreatedSubscription {
    pub subscription_id: SubscriptionId,
    pub status: String,
    /// Initiating payment intent of the first invoice
    pub payment_intent_id: Option<String>,
    /// Secret the client uses to confirm the payment (3-D Secure)
    pub client_secret: Option<String>,
}

/// URLs for hosted checkout redirects
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of creating a hosted checkout session
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: Option<String>,
}

// ============================================================================
// Port Trait
// ============================================================================

/// Billing provider port.
///
/// Calls are made outside any database transaction. Every call that creates
/// an object takes an idempotency key, so retrying after a failed local write
/// returns the object created by the first attempt instead of a duplicate.
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    // Catalog mirror

    async fn create_product(&self, name: &str, description: Option<&str>) -> AppResult<String>;

    async fn update_product(
        &self,
        product_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<()>;

    /// Prices are immutable upstream; changing an amount means creating a new one.
    async fn create_price(&self, request: PriceRequest<'_>) -> AppResult<String>;

    // Customers

    async fn ensure_customer(&self, request: &CustomerRequest) -> AppResult<CustomerId>;

    /// Attach a payment method and make it the customer's default for invoices.
    async fn attach_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &str,
    ) -> AppResult<()>;

    // Subscriptions

    async fn create_subscription(
        &self,
        customer_id: &CustomerId,
        price_id: &str,
        idempotency_key: &str,
    ) -> AppResult<CreatedSubscription>;

    async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        price_id: &str,
        client_reference_id: &str,
        urls: &CheckoutUrls,
    ) -> AppResult<CheckoutSession>;

    async fn cancel_subscription(&self, subscription_id: &SubscriptionId) -> AppResult<()>;
}
