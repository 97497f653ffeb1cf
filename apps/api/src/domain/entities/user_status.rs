use serde::{Deserialize, Serialize};

/// Account standing. Suspension applies to both members of a couple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl UserStatus {
    pub fn is_suspended(&self) -> bool {
        matches!(self, UserStatus::Suspended)
    }
}

impl Default for UserStatus {
    fn default() -> Self {
        UserStatus::Active
    }
}
