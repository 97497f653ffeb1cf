use serde::{Deserialize, Serialize};

use crate::Role;

/// JWT claims for API access tokens.
///
/// The couple membership is intentionally absent: it changes when users pair,
/// so the API resolves it per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID (subject)
    pub sub: String,

    pub role: Role,

    /// Token expiration (Unix timestamp)
    pub exp: i64,

    /// Token issued at (Unix timestamp)
    pub iat: i64,
}
