use pairly_types::Role;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};

/// The authenticated caller, resolved once per request and passed by value
/// into use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub couple_id: Option<Uuid>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}
