use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::plan_duration::PlanDuration;

const SECONDS_PER_DAY: i64 = 86_400;

/// The `[start, end)` interval during which a couple's subscription is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriptionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SubscriptionWindow {
    pub fn starting_at(start: DateTime<Utc>, duration: PlanDuration) -> Option<Self> {
        duration.period_end(start).map(|end| Self { start, end })
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.end > now
    }
}

/// True when `end` is set and lies in the future.
pub fn has_active_window(end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    end.is_some_and(|end| end > now)
}

/// Whole days left until `end`, rounded up. Zero once expired.
pub fn remaining_days(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}
