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

use super::validated;
use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::{
        principal::Principal,
        use_cases::events::{CreateEventInput, UpdateEventInput},
    },
    domain::entities::event_status::EventStatus,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_event))
        .route("/our-event", get(list_events))
        .route("/soft/{id}", delete(soft_delete_event))
        .route(
            "/{id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize, Validate)]
struct CreateEventPayload {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[validate(length(max = 2000))]
    description: Option<String>,
    date: DateTime<Utc>,
    #[validate(length(max = 20))]
    time: Option<String>,
    #[validate(length(max = 300))]
    location: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Deserialize, Validate)]
struct UpdateEventPayload {
    #[validate(length(min = 1, max = 200))]
    title: Option<String>,
    #[validate(length(max = 2000))]
    description: Option<String>,
    date: Option<DateTime<Utc>>,
    #[validate(length(max = 20))]
    time: Option<String>,
    #[validate(length(max = 300))]
    location: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    status: Option<EventStatus>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/event
async fn create_event(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateEventPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let event = app_state
        .event_use_cases
        .create(
            principal,
            CreateEventInput {
                title: payload.title,
                description: payload.description,
                date: payload.date,
                time: payload.time,
                location: payload.location,
                lat: payload.lat,
                lon: payload.lon,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/event/our-event
async fn list_events(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    let events = app_state.event_use_cases.list(principal).await?;
    Ok(Json(events))
}

/// GET /api/event/{id}
async fn get_event(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let event = app_state.event_use_cases.get(principal, id).await?;
    Ok(Json(event))
}

/// PATCH /api/event/{id}
/// The creator edits details, the partner sends `status`.
async fn update_event(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEventPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let event = app_state
        .event_use_cases
        .update(
            principal,
            id,
            UpdateEventInput {
                title: payload.title,
                description: payload.description,
                date: payload.date,
                time: payload.time,
                location: payload.location,
                lat: payload.lat,
                lon: payload.lon,
                status: payload.status,
            },
        )
        .await?;
    Ok(Json(event))
}

/// DELETE /api/event/soft/{id}
async fn soft_delete_event(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let event = app_state.event_use_cases.soft_delete(principal, id).await?;
    Ok(Json(event))
}

/// DELETE /api/event/{id}
async fn delete_event(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    app_state.event_use_cases.delete(principal, id).await?;
    Ok(Json(MessageResponse {
        message: "Event deleted",
    }))
}
