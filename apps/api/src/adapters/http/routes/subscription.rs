use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{users::PartnerSummary, validated};
use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::{
        principal::Principal,
        use_cases::{
            catalog::{CreatePlanInput, SubscriptionPlanProfile, UpdatePlanInput},
            subscription::MySubscription,
        },
    },
    domain::entities::{plan_duration::PlanDuration, pricing::cents_to_decimal},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_plans).post(create_plan).delete(cancel))
        .route("/my-subscription", get(my_subscription))
        .route("/buy-subscription", post(buy_subscription))
        .route("/checkout", post(start_checkout))
        .route("/soft/{id}", delete(soft_delete_plan))
        .route("/{id}", get(get_plan).patch(update_plan))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize, Validate)]
struct CreatePlanPayload {
    #[validate(length(min = 1, max = 100))]
    title: String,
    #[validate(length(max = 1000))]
    description: Option<String>,
    #[validate(range(min = 0))]
    price_cents: i64,
    duration: PlanDuration,
    #[serde(default)]
    is_discounted: bool,
    discount_percent: Option<f64>,
}

#[derive(Deserialize, Validate)]
struct UpdatePlanPayload {
    #[validate(length(min = 1, max = 100))]
    title: Option<String>,
    #[validate(length(max = 1000))]
    description: Option<String>,
    #[validate(range(min = 0))]
    price_cents: Option<i64>,
    duration: Option<PlanDuration>,
    is_discounted: Option<bool>,
    discount_percent: Option<f64>,
}

#[derive(Deserialize)]
struct BuySubscriptionPayload {
    #[serde(alias = "subscriptionId")]
    subscription_id: Uuid,
    #[serde(alias = "methodId", default)]
    method_id: String,
}

#[derive(Deserialize)]
struct CheckoutPayload {
    #[serde(alias = "subscriptionId")]
    subscription_id: Uuid,
}

#[derive(Serialize)]
struct PlanResponse {
    id: Uuid,
    title: String,
    description: Option<String>,
    price_cents: i64,
    price: f64,
    discounted_price_cents: i64,
    discounted_price: f64,
    currency: String,
    duration: PlanDuration,
    is_discounted: bool,
    discount_percent: Option<f64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionPlanProfile> for PlanResponse {
    fn from(plan: SubscriptionPlanProfile) -> Self {
        let discounted = plan.final_price_cents();
        Self {
            id: plan.id,
            title: plan.title,
            description: plan.description,
            price_cents: plan.price_cents,
            price: cents_to_decimal(plan.price_cents),
            discounted_price_cents: discounted,
            discounted_price: cents_to_decimal(discounted),
            currency: plan.currency,
            duration: plan.duration,
            is_discounted: plan.is_discounted,
            discount_percent: plan.discount_percent,
            is_active: plan.is_active,
            created_at: plan.created_at,
            updated_at: plan.updated_at,
        }
    }
}

#[derive(Serialize)]
struct MySubscriptionResponse {
    plan: Option<PlanResponse>,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    is_active: bool,
    remaining_days: i64,
    partner: Option<PartnerSummary>,
}

impl From<MySubscription> for MySubscriptionResponse {
    fn from(mine: MySubscription) -> Self {
        Self {
            plan: mine.plan.map(PlanResponse::from),
            subscription_start: mine.start,
            subscription_end: mine.end,
            is_active: mine.is_active,
            remaining_days: mine.remaining_days,
            partner: mine.partner.map(PartnerSummary::from),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// GET /api/subscription
async fn list_plans(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    let plans = app_state.catalog_use_cases.list_plans(principal).await?;
    Ok(Json(
        plans
            .into_iter()
            .map(PlanResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// GET /api/subscription/{id}
async fn get_plan(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let plan = app_state.catalog_use_cases.get_plan(principal, id).await?;
    Ok(Json(PlanResponse::from(plan)))
}

/// POST /api/subscription
async fn create_plan(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreatePlanPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let plan = app_state
        .catalog_use_cases
        .create_plan(
            principal,
            CreatePlanInput {
                title: payload.title,
                description: payload.description,
                price_cents: payload.price_cents,
                duration: payload.duration,
                is_discounted: payload.is_discounted,
                discount_percent: payload.discount_percent,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(PlanResponse::from(plan))))
}

/// PATCH /api/subscription/{id}
async fn update_plan(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePlanPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let plan = app_state
        .catalog_use_cases
        .update_plan(
            principal,
            id,
            UpdatePlanInput {
                title: payload.title,
                description: payload.description,
                price_cents: payload.price_cents,
                duration: payload.duration,
                is_discounted: payload.is_discounted,
                discount_percent: payload.discount_percent,
            },
        )
        .await?;
    Ok(Json(PlanResponse::from(plan)))
}

/// DELETE /api/subscription/soft/{id}
async fn soft_delete_plan(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    app_state
        .catalog_use_cases
        .soft_delete_plan(principal, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// GET /api/subscription/my-subscription
async fn my_subscription(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    let mine = app_state
        .subscription_use_cases
        .my_subscription(principal)
        .await?;
    Ok(Json(MySubscriptionResponse::from(mine)))
}

/// POST /api/subscription/buy-subscription
async fn buy_subscription(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<BuySubscriptionPayload>,
) -> AppResult<impl IntoResponse> {
    let confirmation = app_state
        .subscription_use_cases
        .purchase(principal, payload.subscription_id, &payload.method_id)
        .await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

/// POST /api/subscription/checkout
async fn start_checkout(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CheckoutPayload>,
) -> AppResult<impl IntoResponse> {
    let started = app_state
        .subscription_use_cases
        .start_checkout(principal, payload.subscription_id)
        .await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// DELETE /api/subscription
async fn cancel(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    app_state.subscription_use_cases.cancel(principal).await?;
    Ok(StatusCode::NO_CONTENT)
}
