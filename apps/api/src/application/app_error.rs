use thiserror::Error;

pub use pairly_types::ErrorCode;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Account suspended")]
    AccountSuspended,

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Forbidden => ErrorCode::Forbidden,
            AppError::AccountSuspended => ErrorCode::AccountSuspended,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
