use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error codes returned by Pairly endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DatabaseError,
    InvalidCredentials,
    InvalidInput,
    Conflict,
    NotFound,
    Forbidden,
    AccountSuspended,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::AccountSuspended => "ACCOUNT_SUSPENDED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JWT verification errors.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    #[error("JWT library error: {0}")]
    Library(#[from] jsonwebtoken::errors::Error),
}
