use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validated;
use crate::{adapters::http::app_state::AppState, app_error::AppResult, application::principal::Principal};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_note))
        .route("/our-board", get(list_notes))
        .route("/{id}", get(get_note).patch(update_note).delete(delete_note))
}

#[derive(Deserialize, Validate)]
struct CreateNotePayload {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[validate(length(max = 2000))]
    description: Option<String>,
}

#[derive(Deserialize, Validate)]
struct UpdateNotePayload {
    #[validate(length(min = 1, max = 200))]
    title: Option<String>,
    #[validate(length(max = 2000))]
    description: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// POST /api/billboard
async fn create_note(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateNotePayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let note = app_state
        .billboard_use_cases
        .create(principal, &payload.title, payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// GET /api/billboard/our-board
async fn list_notes(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    let notes = app_state.billboard_use_cases.list(principal).await?;
    Ok(Json(notes))
}

/// GET /api/billboard/{id}
async fn get_note(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let note = app_state.billboard_use_cases.get(principal, id).await?;
    Ok(Json(note))
}

/// PATCH /api/billboard/{id}
async fn update_note(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateNotePayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let note = app_state
        .billboard_use_cases
        .update(
            principal,
            id,
            payload.title.as_deref(),
            payload.description.as_deref(),
        )
        .await?;
    Ok(Json(note))
}

/// DELETE /api/billboard/{id}
async fn delete_note(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    app_state.billboard_use_cases.delete(principal, id).await?;
    Ok(Json(MessageResponse {
        message: "Note deleted",
    }))
}
