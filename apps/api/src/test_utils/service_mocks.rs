//! Recording fakes for the outbound ports (email, billing provider).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        email::EmailSender,
        payment_provider::{
            BillingProviderPort, CheckoutSession, CheckoutUrls, CreatedSubscription, CustomerId,
            CustomerRequest, PriceRequest, SubscriptionId,
        },
    },
};

// ============================================================================
// RecordingEmailSender
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send returns an error.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Internal("Email provider unavailable".into()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// FakeBillingProvider
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedPrice {
    pub id: String,
    pub product_id: String,
    pub unit_amount_cents: i64,
    pub currency: String,
    pub interval: String,
}

#[derive(Default)]
struct BillingState {
    products: Vec<String>,
    product_updates: Vec<String>,
    prices: Vec<RecordedPrice>,
    customers: HashMap<Uuid, CustomerId>,
    attached_methods: Vec<String>,
    /// Keyed by idempotency key, like the real provider.
    subscriptions: HashMap<String, CreatedSubscription>,
    checkout_references: Vec<String>,
    canceled: Vec<String>,
    omit_payment_intent: bool,
}

/// Billing provider that records every call and hands out sequential ids.
#[derive(Default)]
pub struct FakeBillingProvider {
    state: Mutex<BillingState>,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriptions created from now on carry no payment intent.
    pub fn omit_payment_intent(&self) {
        self.state.lock().unwrap().omit_payment_intent = true;
    }

    pub fn prices(&self) -> Vec<RecordedPrice> {
        self.state.lock().unwrap().prices.clone()
    }

    pub fn product_updates(&self) -> Vec<String> {
        self.state.lock().unwrap().product_updates.clone()
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }

    pub fn attached_methods(&self) -> Vec<String> {
        self.state.lock().unwrap().attached_methods.clone()
    }

    pub fn checkout_references(&self) -> Vec<String> {
        self.state.lock().unwrap().checkout_references.clone()
    }

    pub fn canceled_subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().canceled.clone()
    }

    /// Distinct subscriptions created, replays excluded.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }
}

#[async_trait]
impl BillingProviderPort for FakeBillingProvider {
    async fn create_product(&self, _name: &str, _description: Option<&str>) -> AppResult<String> {
        let mut state = self.state.lock().unwrap();
        let id = format!("prod_{}", state.products.len() + 1);
        state.products.push(id.clone());
        Ok(id)
    }

    async fn update_product(
        &self,
        product_id: &str,
        _name: &str,
        _description: Option<&str>,
    ) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .product_updates
            .push(product_id.to_string());
        Ok(())
    }

    async fn create_price(&self, request: PriceRequest<'_>) -> AppResult<String> {
        let mut state = self.state.lock().unwrap();
        let id = format!("price_{}", state.prices.len() + 1);
        state.prices.push(RecordedPrice {
            id: id.clone(),
            product_id: request.product_id.to_string(),
            unit_amount_cents: request.unit_amount_cents,
            currency: request.currency.to_string(),
            interval: request.interval.to_string(),
        });
        Ok(id)
    }

    async fn ensure_customer(&self, request: &CustomerRequest) -> AppResult<CustomerId> {
        let mut state = self.state.lock().unwrap();
        let next = state.customers.len() + 1;
        Ok(state
            .customers
            .entry(request.user_id)
            .or_insert_with(|| CustomerId::new(format!("cus_{next}")))
            .clone())
    }

    async fn attach_default_payment_method(
        &self,
        _customer_id: &CustomerId,
        payment_method_id: &str,
    ) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .attached_methods
            .push(payment_method_id.to_string());
        Ok(())
    }

    async fn create_subscription(
        &self,
        _customer_id: &CustomerId,
        _price_id: &str,
        idempotency_key: &str,
    ) -> AppResult<CreatedSubscription> {
        let mut state = self.state.lock().unwrap();
        let next = state.subscriptions.len() + 1;
        let omit = state.omit_payment_intent;
        Ok(state
            .subscriptions
            .entry(idempotency_key.to_string())
            .or_insert_with(|| CreatedSubscription {
                subscription_id: SubscriptionId::new(format!("sub_{next}")),
                status: "incomplete".to_string(),
                payment_intent_id: (!omit).then(|| format!("pi_{next}")),
                client_secret: (!omit).then(|| format!("pi_{next}_secret")),
            })
            .clone())
    }

    async fn create_checkout_session(
        &self,
        _customer_id: &CustomerId,
        _price_id: &str,
        client_reference_id: &str,
        _urls: &CheckoutUrls,
    ) -> AppResult<CheckoutSession> {
        let mut state = self.state.lock().unwrap();
        state
            .checkout_references
            .push(client_reference_id.to_string());
        let id = format!("cs_{}", state.checkout_references.len());
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.test/{id}")),
            session_id: id,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &SubscriptionId) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .canceled
            .push(subscription_id.as_str().to_string());
        Ok(())
    }
}
