use std::sync::Arc;

use crate::{
    application::use_cases::{
        admin::AdminUseCases, auth::AuthUseCases, billboard::BillboardUseCases,
        catalog::CatalogUseCases, events::EventUseCases, pairing::PairingUseCases,
        payment::PaymentHistoryUseCases, reconciler::PaymentReconciler,
        subscription::SubscriptionUseCases,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth_use_cases: Arc<AuthUseCases>,
    pub pairing_use_cases: Arc<PairingUseCases>,
    pub catalog_use_cases: Arc<CatalogUseCases>,
    pub subscription_use_cases: Arc<SubscriptionUseCases>,
    pub payment_use_cases: Arc<PaymentHistoryUseCases>,
    pub reconciler: Arc<PaymentReconciler>,
    pub event_use_cases: Arc<EventUseCases>,
    pub billboard_use_cases: Arc<BillboardUseCases>,
    pub admin_use_cases: Arc<AdminUseCases>,
}
