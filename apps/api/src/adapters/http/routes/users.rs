use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validated;
use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::{
        principal::Principal,
        use_cases::{
            admin::{CoupleDirectory, CoupleStatus, CoupleSummary},
            auth::UserProfile,
        },
    },
    domain::entities::{plan_duration::PlanDuration, user_role::UserRole, user_status::UserStatus},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_couples))
        .route("/me", get(get_me).patch(update_me))
        .route("/{id}/status", patch(set_status))
        .route("/hard-delete/{couple_id}", delete(hard_delete_couple))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub(super) struct PartnerSummary {
    id: Uuid,
    email: String,
    full_name: String,
}

impl From<UserProfile> for PartnerSummary {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
        }
    }
}

#[derive(Serialize)]
pub(super) struct UserResponse {
    id: Uuid,
    email: String,
    full_name: String,
    role: UserRole,
    status: UserStatus,
    is_email_verified: bool,
    invite_code: Option<String>,
    is_connected: bool,
    couple_id: Option<Uuid>,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partner: Option<PartnerSummary>,
    created_at: DateTime<Utc>,
}

impl UserResponse {
    pub(super) fn new(user: UserProfile, partner: Option<UserProfile>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            status: user.status,
            is_email_verified: user.is_email_verified,
            invite_code: user.invite_code,
            is_connected: user.is_connected,
            couple_id: user.couple_id,
            subscription_start: user.subscription_start,
            subscription_end: user.subscription_end,
            partner: partner.map(PartnerSummary::from),
            created_at: user.created_at,
        }
    }
}

#[derive(Deserialize)]
struct SetStatusPayload {
    status: UserStatus,
}

#[derive(Serialize)]
struct SetStatusResponse {
    updated: u64,
}

#[derive(Deserialize, Validate)]
struct UpdateProfilePayload {
    #[validate(length(min = 1, max = 100))]
    #[serde(alias = "fullName")]
    full_name: String,
}

#[derive(Deserialize)]
struct CoupleListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    #[serde(alias = "searchTerm")]
    search_term: Option<String>,
    status: Option<String>,
}

impl CoupleListQuery {
    fn status(&self) -> AppResult<Option<CoupleStatus>> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(AppError::InvalidInput))
            .transpose()
    }
}

#[derive(Serialize)]
struct MemberSummary {
    id: Uuid,
    email: String,
    full_name: String,
    status: UserStatus,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CoupleResponse {
    couple_id: Uuid,
    created_at: DateTime<Utc>,
    status: CoupleStatus,
    subscription_active: bool,
    plan_duration: Option<PlanDuration>,
    members: Vec<MemberSummary>,
}

impl From<CoupleSummary> for CoupleResponse {
    fn from(couple: CoupleSummary) -> Self {
        Self {
            couple_id: couple.couple_id,
            created_at: couple.created_at,
            status: couple.status,
            subscription_active: couple.subscription_active,
            plan_duration: couple.plan_duration,
            members: couple
                .members
                .into_iter()
                .map(|m| MemberSummary {
                    id: m.id,
                    email: m.email,
                    full_name: m.full_name,
                    status: m.status,
                    created_at: m.created_at,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct CoupleListResponse {
    couples: Vec<CoupleResponse>,
    total: i64,
    page: i64,
    limit: i64,
}

impl From<CoupleDirectory> for CoupleListResponse {
    fn from(directory: CoupleDirectory) -> Self {
        Self {
            couples: directory.couples.into_iter().map(CoupleResponse::from).collect(),
            total: directory.total,
            page: directory.page,
            limit: directory.limit,
        }
    }
}

#[derive(Serialize)]
struct HardDeleteResponse {
    couple_id: Uuid,
    deleted_users: Vec<Uuid>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/users
/// Admin directory of couples.
async fn list_couples(
    State(app_state): State<AppState>,
    principal: Principal,
    Query(query): Query<CoupleListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query.status()?;
    let directory = app_state
        .admin_use_cases
        .list_couples(principal, query.search_term, status, query.page, query.limit)
        .await?;
    Ok(Json(CoupleListResponse::from(directory)))
}

/// PATCH /api/users/me
async fn update_me(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<UpdateProfilePayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    app_state
        .auth_use_cases
        .update_profile(principal, &payload.full_name)
        .await?;
    let (user, partner) = app_state.auth_use_cases.me(principal).await?;
    Ok(Json(UserResponse::new(user, partner)))
}

/// DELETE /api/users/hard-delete/{couple_id}
async fn hard_delete_couple(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(couple_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let deleted = app_state
        .admin_use_cases
        .hard_delete_couple(principal, couple_id)
        .await?;
    Ok(Json(HardDeleteResponse {
        couple_id,
        deleted_users: deleted.into_iter().map(|u| u.id).collect(),
    }))
}

/// GET /api/users/me
async fn get_me(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    let (user, partner) = app_state.auth_use_cases.me(principal).await?;
    Ok(Json(UserResponse::new(user, partner)))
}

/// PATCH /api/users/{id}/status
/// Suspends or reactivates a user and their partner.
async fn set_status(
    State(app_state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetStatusPayload>,
) -> AppResult<impl IntoResponse> {
    let updated = app_state
        .auth_use_cases
        .set_status(principal, user_id, payload.status)
        .await?;
    Ok(Json(SetStatusResponse { updated }))
}
