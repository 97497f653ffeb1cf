use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::principal::Principal,
    domain::entities::payment_status::PaymentStatus,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments))
        .route("/admin", get(list_all_payments))
        .route("/admin/{id}", get(get_payment_admin))
        .route("/session/{session_id}", get(get_payment_by_session))
        .route("/cancel/{id}", post(cancel_payment))
        .route("/{id}", get(get_payment))
}

#[derive(Deserialize)]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    status: Option<String>,
}

impl ListQuery {
    fn status(&self) -> AppResult<Option<PaymentStatus>> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(AppError::InvalidInput))
            .transpose()
    }
}

/// GET /api/payment
async fn list_payments(
    State(app_state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query.status()?;
    let history = app_state
        .payment_use_cases
        .list_for_couple(principal, query.page, query.limit, status)
        .await?;
    Ok(Json(history))
}

/// GET /api/payment/admin
async fn list_all_payments(
    State(app_state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query.status()?;
    let history = app_state
        .payment_use_cases
        .list_all(principal, query.page, query.limit, status)
        .await?;
    Ok(Json(history))
}

/// GET /api/payment/admin/{id}
async fn get_payment_admin(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    principal.require_admin()?;
    let payment = app_state.payment_use_cases.get(principal, id).await?;
    Ok(Json(payment))
}

/// GET /api/payment/session/{session_id}
/// Polled by the client after returning from hosted checkout.
async fn get_payment_by_session(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let payment = app_state
        .payment_use_cases
        .get_by_session(principal, &session_id)
        .await?;
    Ok(Json(payment))
}

/// GET /api/payment/{id}
async fn get_payment(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let payment = app_state.payment_use_cases.get(principal, id).await?;
    Ok(Json(payment))
}

/// POST /api/payment/cancel/{id}
async fn cancel_payment(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let payment = app_state.payment_use_cases.cancel(principal, id).await?;
    Ok(Json(payment))
}
