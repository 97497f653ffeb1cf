use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Billing cadence of a catalog plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_duration", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanDuration {
    Free,
    Monthly,
    Yearly,
}

impl PlanDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanDuration::Free => "free",
            PlanDuration::Monthly => "monthly",
            PlanDuration::Yearly => "yearly",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, PlanDuration::Free)
    }

    /// Stripe `recurring[interval]` value. Free plans are not mirrored.
    pub fn billing_interval(&self) -> Option<&'static str> {
        match self {
            PlanDuration::Free => None,
            PlanDuration::Monthly => Some("month"),
            PlanDuration::Yearly => Some("year"),
        }
    }

    /// End of a period of this length starting at `start`.
    ///
    /// Calendar months are used, so Jan 31 + 1 month clamps to the end of February.
    pub fn period_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PlanDuration::Free => None,
            PlanDuration::Monthly => start.checked_add_months(Months::new(1)),
            PlanDuration::Yearly => start.checked_add_months(Months::new(12)),
        }
    }
}

impl std::fmt::Display for PlanDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
