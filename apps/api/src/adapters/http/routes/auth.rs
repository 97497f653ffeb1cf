use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{users::UserResponse, validated};
use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::{
        principal::Principal,
        use_cases::auth::{LoginOutcome, OtpVerification},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-otp", post(verify_otp))
        .route("/resend-otp", post(resend_otp))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/change-password", post(change_password))
        .route("/code", get(get_invite_code))
        .route("/connect", post(connect))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize, Validate)]
struct RegisterPayload {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    #[validate(length(min = 1, max = 100))]
    #[serde(alias = "fullName")]
    full_name: String,
}

#[derive(Deserialize, Validate)]
struct LoginPayload {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Deserialize, Validate)]
struct EmailPayload {
    #[validate(email)]
    email: String,
}

#[derive(Deserialize, Validate)]
struct VerifyOtpPayload {
    #[validate(email)]
    email: String,
    #[validate(length(equal = 6))]
    otp: String,
}

#[derive(Deserialize, Validate)]
struct ResetPasswordPayload {
    #[validate(email)]
    email: String,
    #[validate(length(equal = 6))]
    otp: String,
    #[validate(length(min = 8, max = 128))]
    #[serde(alias = "newPassword")]
    new_password: String,
}

#[derive(Deserialize, Validate)]
struct ChangePasswordPayload {
    #[validate(length(min = 1))]
    #[serde(alias = "oldPassword")]
    old_password: String,
    #[validate(length(min = 8, max = 128))]
    #[serde(alias = "newPassword")]
    new_password: String,
}

#[derive(Deserialize)]
struct ConnectPayload {
    #[serde(alias = "inviteCode")]
    invite_code: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct RegisterResponse {
    message: &'static str,
    user_id: Uuid,
    email: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    user: UserResponse,
}

#[derive(Serialize)]
struct VerificationRequiredResponse {
    message: &'static str,
    verification_required: bool,
    email: String,
}

#[derive(Serialize)]
struct InviteCodeResponse {
    invite_code: String,
}

#[derive(Serialize)]
struct ConnectResponse {
    message: &'static str,
    couple_id: Uuid,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    let user = app_state
        .auth_use_cases
        .register(&payload.email, &payload.password, &payload.full_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Verification code sent",
            user_id: user.id,
            email: user.email,
        }),
    ))
}

/// POST /api/auth/login
/// Unverified users get a fresh code instead of a token.
async fn login(
    State(app_state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<Response> {
    let payload = validated(payload)?;
    let outcome = app_state
        .auth_use_cases
        .login(&payload.email, &payload.password)
        .await?;

    let response = match outcome {
        LoginOutcome::Authenticated { access_token, user } => Json(TokenResponse {
            access_token,
            token_type: "Bearer",
            user: UserResponse::new(user, None),
        })
        .into_response(),
        LoginOutcome::VerificationRequired { email } => Json(VerificationRequiredResponse {
            message: "Verify your email to continue",
            verification_required: true,
            email,
        })
        .into_response(),
    };
    Ok(response)
}

/// POST /api/auth/verify-otp
async fn verify_otp(
    State(app_state): State<AppState>,
    Json(payload): Json<VerifyOtpPayload>,
) -> AppResult<Response> {
    let payload = validated(payload)?;
    let verification = app_state
        .auth_use_cases
        .verify_otp(&payload.email, &payload.otp)
        .await?;

    let response = match verification {
        OtpVerification::EmailVerified { access_token, user } => Json(TokenResponse {
            access_token,
            token_type: "Bearer",
            user: UserResponse::new(user, None),
        })
        .into_response(),
        OtpVerification::ResetCodeValid => Json(MessageResponse {
            message: "Code is valid",
        })
        .into_response(),
    };
    Ok(response)
}

/// POST /api/auth/resend-otp
async fn resend_otp(
    State(app_state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    app_state.auth_use_cases.resend_otp(&payload.email).await?;
    Ok(Json(MessageResponse {
        message: "Verification code sent",
    }))
}

/// POST /api/auth/forgot-password
async fn forgot_password(
    State(app_state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    app_state
        .auth_use_cases
        .forgot_password(&payload.email)
        .await?;
    Ok(Json(MessageResponse {
        message: "Reset code sent",
    }))
}

/// POST /api/auth/reset-password
async fn reset_password(
    State(app_state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    app_state
        .auth_use_cases
        .reset_password(&payload.email, &payload.otp, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}

/// POST /api/auth/change-password
async fn change_password(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<ChangePasswordPayload>,
) -> AppResult<impl IntoResponse> {
    let payload = validated(payload)?;
    app_state
        .auth_use_cases
        .change_password(principal, &payload.old_password, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/code
async fn get_invite_code(
    State(app_state): State<AppState>,
    principal: Principal,
) -> AppResult<impl IntoResponse> {
    let invite_code = app_state
        .pairing_use_cases
        .issue_invite_code(principal)
        .await?;
    Ok(Json(InviteCodeResponse { invite_code }))
}

/// POST /api/auth/connect
async fn connect(
    State(app_state): State<AppState>,
    principal: Principal,
    Json(payload): Json<ConnectPayload>,
) -> AppResult<impl IntoResponse> {
    let couple_id = app_state
        .pairing_use_cases
        .redeem_invite_code(principal, &payload.invite_code)
        .await?;
    Ok(Json(ConnectResponse {
        message: "You are now connected",
        couple_id,
    }))
}
