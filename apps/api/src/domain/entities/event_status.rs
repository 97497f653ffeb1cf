use serde::{Deserialize, Serialize};

/// Where a shared calendar entry stands between the two partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Pending,
    Approved,
    Cancelled,
    Past,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Past => "past",
        }
    }

    /// The partner's answer to a proposed event.
    pub fn is_partner_decision(&self) -> bool {
        matches!(self, EventStatus::Approved | EventStatus::Cancelled)
    }

    /// Whether an event dated in the past should be rolled over to PAST.
    pub fn rolls_over_to_past(&self) -> bool {
        !matches!(self, EventStatus::Past | EventStatus::Cancelled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
