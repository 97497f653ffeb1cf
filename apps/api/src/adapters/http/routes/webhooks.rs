//! Inbound billing provider webhooks.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{error, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::reconciler::{BillingEvent, is_retryable_error},
    infra::stripe_client::{StripeClient, WEBHOOK_TOLERANCE_SECS},
};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// POST /api/webhooks/stripe
///
/// Only a bad signature or an unreadable event is answered with 400. Once an
/// event is authentic it is always acknowledged, so processing failures are
/// logged here instead of triggering endless redelivery.
async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidInput("Missing Stripe signature".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        app_state.config.stripe_webhook_secret.expose_secret(),
        WEBHOOK_TOLERANCE_SECS,
        Utc::now().timestamp(),
    )
    .inspect_err(|e| warn!(error = %e, "Rejected webhook with bad signature"))?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;
    let event = BillingEvent::from_json(&payload)?;

    match app_state.reconciler.reconcile(&event).await {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(json!({ "received": true, "outcome": outcome.as_str() })),
        )),
        Err(e) => {
            error!(
                error = %e,
                event_id = %event.id,
                event_type = %event.event_type,
                retryable = is_retryable_error(&e),
                "Webhook processing failed"
            );
            Ok((
                StatusCode::OK,
                Json(json!({ "received": true, "outcome": "error" })),
            ))
        }
    }
}
