use std::fs::File;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{email::ResendEmailSender, http::app_state::AppState},
    infra::{
        config::AppConfig, postgres_persistence, stripe_payment_adapter::StripePaymentAdapter,
    },
    use_cases::{
        admin::AdminUseCases, auth::AuthUseCases, billboard::BillboardUseCases,
        catalog::CatalogUseCases, events::EventUseCases, pairing::PairingUseCases,
        payment::PaymentHistoryUseCases, reconciler::PaymentReconciler,
        subscription::SubscriptionUseCases,
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc =
        Arc::new(postgres_persistence(&config.database_url, config.db_max_connections).await?);

    let email = Arc::new(ResendEmailSender::new(
        SecretString::new(config.resend_api_key.expose_secret().into()),
        config.email_from.clone(),
    ));
    let billing = Arc::new(StripePaymentAdapter::new(SecretString::new(
        config.stripe_secret_key.expose_secret().into(),
    )));
    let origin = config.app_origin_str();

    let auth_use_cases = AuthUseCases::new(
        postgres_arc.clone(),
        email,
        SecretString::new(config.jwt_secret.expose_secret().into()),
        config.access_token_ttl,
        config.otp_ttl_minutes,
        origin.clone(),
    );

    let pairing_use_cases =
        PairingUseCases::new(postgres_arc.clone(), postgres_arc.clone(), config.tx_timeout);

    let catalog_use_cases = CatalogUseCases::new(
        postgres_arc.clone(),
        billing.clone(),
        config.billing_currency.clone(),
    );

    let subscription_use_cases = SubscriptionUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        billing.clone(),
        origin,
        config.tx_timeout,
        config.billing_dual_cancel,
    );

    let payment_use_cases = PaymentHistoryUseCases::new(postgres_arc.clone(), billing.clone());

    let event_use_cases = EventUseCases::new(postgres_arc.clone());
    let billboard_use_cases = BillboardUseCases::new(postgres_arc.clone());
    let admin_use_cases = AdminUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        billing,
    );

    let reconciler = PaymentReconciler::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc,
    );

    Ok(AppState {
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
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pairly_api=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs), skipped when the file cannot be created
    let (json_layer, file_error) = match File::create("app.log") {
        Ok(file) => (
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(true)
                    .with_span_list(true),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    if let Some(e) = file_error {
        warn!(error = %e, "Cannot create app.log, JSON logs disabled");
    }
}
