//! Back-office view of couples: directory listing and permanent removal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{BillingProviderPort, SubscriptionId},
        principal::Principal,
        use_cases::{
            auth::UserProfile,
            catalog::PlanRepo,
            payment::{PaymentRepo, normalize_paging},
        },
    },
    domain::entities::{
        plan_duration::PlanDuration, subscription_window::has_active_window,
        user_status::UserStatus,
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait CoupleDirectoryRepo: Send + Sync {
    /// Couples with two non-admin members, newest first.
    async fn list_couples(&self, query: &CoupleQuery) -> AppResult<CouplePage>;

    /// Delete the couple, both members and everything they own in one
    /// transaction. Returns the deleted members, or `None` when no couple of
    /// two exists under `couple_id`.
    async fn hard_delete_couple(&self, couple_id: Uuid) -> AppResult<Option<Vec<UserProfile>>>;
}

// ============================================================================
// Types
// ============================================================================

/// Standing of a couple as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoupleStatus {
    Active,
    Suspended,
    Mixed,
}

impl CoupleStatus {
    pub fn of(members: &[UserProfile]) -> Self {
        if members.iter().all(|m| m.status == UserStatus::Active) {
            CoupleStatus::Active
        } else if members.iter().all(|m| m.status == UserStatus::Suspended) {
            CoupleStatus::Suspended
        } else {
            CoupleStatus::Mixed
        }
    }
}

impl std::str::FromStr for CoupleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(CoupleStatus::Active),
            "suspended" => Ok(CoupleStatus::Suspended),
            "mixed" => Ok(CoupleStatus::Mixed),
            _ => Err(format!("Invalid couple status: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoupleQuery {
    /// Case-insensitive match on either member's name or email.
    pub search: Option<String>,
    pub status: Option<CoupleStatus>,
    pub page: i64,
    pub limit: i64,
}

impl CoupleQuery {
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct CoupleMembers {
    pub couple_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Ordered by full name.
    pub members: Vec<UserProfile>,
}

#[derive(Debug, Clone)]
pub struct CouplePage {
    pub couples: Vec<CoupleMembers>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct CoupleSummary {
    pub couple_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub members: Vec<UserProfile>,
    pub status: CoupleStatus,
    pub subscription_active: bool,
    pub plan_duration: Option<PlanDuration>,
}

#[derive(Debug, Clone)]
pub struct CoupleDirectory {
    pub couples: Vec<CoupleSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct AdminUseCases {
    directory_repo: Arc<dyn CoupleDirectoryRepo>,
    plan_repo: Arc<dyn PlanRepo>,
    payment_repo: Arc<dyn PaymentRepo>,
    billing: Arc<dyn BillingProviderPort>,
}

impl AdminUseCases {
    pub fn new(
        directory_repo: Arc<dyn CoupleDirectoryRepo>,
        plan_repo: Arc<dyn PlanRepo>,
        payment_repo: Arc<dyn PaymentRepo>,
        billing: Arc<dyn BillingProviderPort>,
    ) -> Self {
        Self {
            directory_repo,
            plan_repo,
            payment_repo,
            billing,
        }
    }

    pub async fn list_couples(
        &self,
        principal: Principal,
        search: Option<String>,
        status: Option<CoupleStatus>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<CoupleDirectory> {
        principal.require_admin()?;

        let (page, limit) = normalize_paging(page, limit);
        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let result = self
            .directory_repo
            .list_couples(&CoupleQuery {
                search,
                status,
                page,
                limit,
            })
            .await?;

        let now = Utc::now();
        let mut couples = Vec::with_capacity(result.couples.len());
        for couple in result.couples {
            let plan_duration = match couple.members.iter().find_map(|m| m.subscription_plan_id) {
                Some(plan_id) => self.plan_repo.get_by_id(plan_id).await?.map(|p| p.duration),
                None => None,
            };
            couples.push(CoupleSummary {
                status: CoupleStatus::of(&couple.members),
                subscription_active: couple
                    .members
                    .iter()
                    .any(|m| has_active_window(m.subscription_end, now)),
                plan_duration,
                couple_id: couple.couple_id,
                created_at: couple.created_at,
                members: couple.members,
            });
        }

        Ok(CoupleDirectory {
            couples,
            total: result.total,
            page,
            limit,
        })
    }

    /// Remove a couple for good. Live provider subscriptions are stopped first.
    #[instrument(skip(self))]
    pub async fn hard_delete_couple(
        &self,
        principal: Principal,
        couple_id: Uuid,
    ) -> AppResult<Vec<UserProfile>> {
        principal.require_admin()?;

        self.cancel_live_subscriptions(couple_id).await?;

        let deleted = self
            .directory_repo
            .hard_delete_couple(couple_id)
            .await?
            .ok_or(AppError::NotFound)?;

        info!(%couple_id, members = deleted.len(), "Couple deleted");
        Ok(deleted)
    }

    async fn cancel_live_subscriptions(&self, couple_id: Uuid) -> AppResult<()> {
        let pending = self.payment_repo.pending_attempt_for_couple(couple_id).await?;
        let paid = self.payment_repo.latest_success_for_couple(couple_id).await?;

        let mut subscriptions: Vec<String> = [pending, paid]
            .into_iter()
            .flatten()
            .filter_map(|p| p.stripe_subscription_id)
            .collect();
        subscriptions.dedup();

        for subscription_id in subscriptions {
            let subscription_id = SubscriptionId::new(subscription_id);
            if let Err(e) = self.billing.cancel_subscription(&subscription_id).await {
                warn!(%couple_id, %subscription_id, error = %e, "Upstream cancel failed");
            }
        }
        Ok(())
    }
}
