use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState, app_error::AppError, application::jwt,
    application::principal::Principal,
};

/// Resolves the caller from `Authorization: Bearer <token>`.
///
/// The token only proves identity; role and couple membership are re-read
/// from the user row so pairing and suspension take effect immediately.
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::InvalidCredentials)?;

        let claims = jwt::verify(bearer.token(), &state.config.jwt_secret)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidCredentials)?;

        state.auth_use_cases.resolve_principal(user_id).await
    }
}
