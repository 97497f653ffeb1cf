use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use pairly_types::{AccessClaims, Role, verify_access_token};
use secrecy::ExposeSecret;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};

const CLOCK_SKEW_SECONDS: u64 = 60;

pub fn issue(
    user_id: Uuid,
    role: Role,
    secret: &secrecy::SecretString,
    ttl: Duration,
) -> AppResult<String> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let exp = now + ttl.whole_seconds();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        role,
        iat: now,
        exp,
    };
    let header = Header::new(Algorithm::HS256);
    encode(
        &header,
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify(token: &str, secret: &secrecy::SecretString) -> AppResult<AccessClaims> {
    verify_access_token(token, secret.expose_secret(), CLOCK_SKEW_SECONDS).map_err(|e| {
        tracing::debug!(error = %e, "Access token rejected");
        AppError::InvalidCredentials
    })
}
