use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use uuid::Uuid;

use crate::{AccessClaims, JwtError};

/// Verifies an HS256 access token and returns its claims.
///
/// # Arguments
/// * `token` - The JWT token string
/// * `secret` - The shared signing secret
/// * `clock_skew_seconds` - Tolerance for clock skew (typically 60 seconds)
///
/// The subject must be a UUID; anything else is rejected as invalid claims.
pub fn verify_access_token(
    token: &str,
    secret: &str,
    clock_skew_seconds: u64,
) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = clock_skew_seconds;

    let token_data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::Library(e),
    })?;

    Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| JwtError::InvalidClaims("Invalid sub format".into()))?;

    Ok(token_data.claims)
}
