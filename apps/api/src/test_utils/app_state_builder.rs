//! Test app state builder for HTTP-level integration testing.
//!
//! `TestAppStateBuilder` wires every use case against one `InMemoryPersistence`
//! and the recording fakes, so HTTP tests exercise the real router and handlers.

use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use time::Duration;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::jwt,
    application::use_cases::{
        admin::AdminUseCases, auth::{AuthUseCases, UserProfile}, billboard::BillboardUseCases,
        catalog::CatalogUseCases, events::EventUseCases, pairing::PairingUseCases,
        payment::PaymentHistoryUseCases, reconciler::PaymentReconciler,
        subscription::SubscriptionUseCases,
    },
    infra::config::AppConfig,
    test_utils::{FakeBillingProvider, InMemoryPersistence, RecordingEmailSender},
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// `Authorization` header value for `user`, signed with the test secret.
pub fn bearer_for(user: &UserProfile) -> String {
    let token = jwt::issue(
        user.id,
        user.role.into(),
        &SecretString::new(TEST_JWT_SECRET.into()),
        Duration::hours(1),
    )
    .unwrap();
    format!("Bearer {token}")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
        access_token_ttl: Duration::hours(1),
        app_origin: Url::parse("https://app.pairly.test").unwrap(),
        cors_origin: HeaderValue::from_static("https://app.pairly.test"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        db_max_connections: 1,
        otp_ttl_minutes: 10,
        resend_api_key: SecretString::new("re_test".into()),
        email_from: "Pairly <test@pairly.test>".to_string(),
        stripe_secret_key: SecretString::new("sk_test".into()),
        stripe_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
        billing_currency: "usd".to_string(),
        tx_timeout: std::time::Duration::from_secs(5),
        billing_dual_cancel: false,
    }
}

pub struct TestAppStateBuilder {
    store: Arc<InMemoryPersistence>,
    billing: Arc<FakeBillingProvider>,
    email: Arc<RecordingEmailSender>,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryPersistence::new()),
            billing: Arc::new(FakeBillingProvider::new()),
            email: Arc::new(RecordingEmailSender::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<InMemoryPersistence>) -> Self {
        self.store = store;
        self
    }

    pub fn with_billing(mut self, billing: Arc<FakeBillingProvider>) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_email(mut self, email: Arc<RecordingEmailSender>) -> Self {
        self.email = email;
        self
    }

    pub fn build(self) -> AppState {
        let config = test_config();
        let store = self.store;
        let origin = config.app_origin_str();

        let auth_use_cases = AuthUseCases::new(
            store.clone(),
            self.email,
            SecretString::new(config.jwt_secret.expose_secret().into()),
            config.access_token_ttl,
            config.otp_ttl_minutes,
            origin.clone(),
        );
        let pairing_use_cases =
            PairingUseCases::new(store.clone(), store.clone(), config.tx_timeout);
        let catalog_use_cases = CatalogUseCases::new(
            store.clone(),
            self.billing.clone(),
            config.billing_currency.clone(),
        );
        let subscription_use_cases = SubscriptionUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            self.billing.clone(),
            origin,
            config.tx_timeout,
            config.billing_dual_cancel,
        );
        let payment_use_cases = PaymentHistoryUseCases::new(store.clone(), self.billing.clone());
        let event_use_cases = EventUseCases::new(store.clone());
        let billboard_use_cases = BillboardUseCases::new(store.clone());
        let admin_use_cases =
            AdminUseCases::new(store.clone(), store.clone(), store.clone(), self.billing);
        let reconciler =
            PaymentReconciler::new(store.clone(), store.clone(), store.clone(), store);

        AppState {
            config: Arc::new(config),
            auth_use_cases: Arc::new(auth_use_cases),
            pairing_use_cases: Arc::new(pairing_use_cases),
            catalog_use_cases: Arc::new(catalog_use_cases),
            subscription_use_cases: Arc::new(subscription_use_cases),
            payment_use_cases: Arc::new(payment_use_cases),
            reconciler: Arc::new(reconciler),
            event_use_cases: Arc::new(event_use_cases),
            billboard_use_cases: Arc::new(billboard_use_cases),
            admin_use_cases: Arc::new(admin_use_cases),
        }
    }
}
