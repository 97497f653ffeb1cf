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
    },
    domain::entities::payment_status::PaymentStatus,
};

const DEFAULT_PAGE_LIMIT: i64 = 10;
const MAX_PAGE_LIMIT: i64 = 100;
/// Keeps `(page - 1) * limit` far from overflow.
const MAX_PAGE: i64 = 1_000_000;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    /// Insert a purchase row, or return the existing row for the same
    /// provider subscription. Retrying a purchase never creates a second row.
    async fn upsert_purchase(&self, input: &NewPayment) -> AppResult<PaymentProfile>;

    /// Insert a row whose id was chosen by the caller.
    async fn create(&self, input: &NewPayment) -> AppResult<PaymentProfile>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentProfile>>;

    async fn get_by_session(&self, session_id: &str) -> AppResult<Option<PaymentProfile>>;

    async fn find_by_payment_intent(&self, intent_id: &str) -> AppResult<Option<PaymentProfile>>;

    async fn find_by_invoice(&self, invoice_id: &str) -> AppResult<Option<PaymentProfile>>;

    /// Most recent row for a provider subscription, renewals included.
    async fn latest_by_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Option<PaymentProfile>>;

    async fn latest_success_for_couple(&self, couple_id: Uuid)
    -> AppResult<Option<PaymentProfile>>;

    /// The couple's unsettled purchase or checkout attempt, if any.
    async fn pending_attempt_for_couple(&self, couple_id: Uuid)
    -> AppResult<Option<PaymentProfile>>;

    /// Most recent purchase or checkout attempt that left PENDING.
    async fn latest_settled_attempt_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>>;

    async fn list(&self, query: &PaymentListQuery) -> AppResult<PaymentPage>;

    /// Sum of SUCCESS amounts across all payments.
    async fn total_revenue_cents(&self) -> AppResult<i64>;

    /// Compare-and-set on status. Returns false if the row was not in `from`.
    async fn transition(&self, id: Uuid, from: PaymentStatus, to: PaymentStatus)
    -> AppResult<bool>;
}

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PaymentProfile {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
}

/// A payment row as shown in history listings.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentListItem {
    #[serde(flatten)]
    pub payment: PaymentProfile,
    pub plan_title: Option<String>,
    /// Member names of the paying couple, joined with " & ".
    pub customer_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentScope {
    All,
    Couple(Uuid),
    User(Uuid),
}

#[derive(Debug, Clone)]
pub struct PaymentListQuery {
    pub scope: PaymentScope,
    pub status: Option<PaymentStatus>,
    pub page: i64,
    pub limit: i64,
}

impl PaymentListQuery {
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPage {
    pub payments: Vec<PaymentListItem>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistory {
    pub payments: Vec<PaymentListItem>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_revenue_cents: Option<i64>,
}

/// Clamp raw paging parameters to sane values.
pub fn normalize_paging(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PaymentHistoryUseCases {
    payment_repo: Arc<dyn PaymentRepo>,
    billing: Arc<dyn BillingProviderPort>,
}

impl PaymentHistoryUseCases {
    pub fn new(payment_repo: Arc<dyn PaymentRepo>, billing: Arc<dyn BillingProviderPort>) -> Self {
        Self {
            payment_repo,
            billing,
        }
    }

    /// Payments of the caller's couple, or the caller's own while unpaired.
    pub async fn list_for_couple(
        &self,
        principal: Principal,
        page: Option<i64>,
        limit: Option<i64>,
        status: Option<PaymentStatus>,
    ) -> AppResult<PaymentHistory> {
        let scope = match principal.couple_id {
            Some(couple_id) => PaymentScope::Couple(couple_id),
            None => PaymentScope::User(principal.user_id),
        };
        self.list(scope, page, limit, status, None).await
    }

    pub async fn list_all(
        &self,
        principal: Principal,
        page: Option<i64>,
        limit: Option<i64>,
        status: Option<PaymentStatus>,
    ) -> AppResult<PaymentHistory> {
        principal.require_admin()?;
        let revenue = self.payment_repo.total_revenue_cents().await?;
        self.list(PaymentScope::All, page, limit, status, Some(revenue))
            .await
    }

    async fn list(
        &self,
        scope: PaymentScope,
        page: Option<i64>,
        limit: Option<i64>,
        status: Option<PaymentStatus>,
        total_revenue_cents: Option<i64>,
    ) -> AppResult<PaymentHistory> {
        let (page, limit) = normalize_paging(page, limit);
        let result = self
            .payment_repo
            .list(&PaymentListQuery {
                scope,
                status,
                page,
                limit,
            })
            .await?;

        Ok(PaymentHistory {
            total_pages: total_pages(result.total, limit),
            payments: result.payments,
            total: result.total,
            page,
            limit,
            total_revenue_cents,
        })
    }

    pub async fn get(&self, principal: Principal, id: Uuid) -> AppResult<PaymentProfile> {
        let payment = self
            .payment_repo
            .get_by_id(id)
            .await?
            .ok_or(AppError::NotFound)?;
        ensure_visible(principal, &payment)?;
        Ok(payment)
    }

    pub async fn get_by_session(
        &self,
        principal: Principal,
        session_id: &str,
    ) -> AppResult<PaymentProfile> {
        let payment = self
            .payment_repo
            .get_by_session(session_id)
            .await?
            .ok_or(AppError::NotFound)?;
        ensure_visible(principal, &payment)?;
        Ok(payment)
    }

    /// Explicit cancel. The only path that may move a SUCCESS payment.
    #[instrument(skip(self))]
    pub async fn cancel(&self, principal: Principal, id: Uuid) -> AppResult<PaymentProfile> {
        let payment = self.get(principal, id).await?;

        match payment.status {
            PaymentStatus::Canceled => return Ok(payment),
            PaymentStatus::Failed => {
                return Err(AppError::InvalidInput(
                    "A failed payment cannot be canceled".into(),
                ));
            }
            PaymentStatus::Pending | PaymentStatus::Success => {}
        }

        let moved = self
            .payment_repo
            .transition(id, payment.status, PaymentStatus::Canceled)
            .await?;

        let current = self
            .payment_repo
            .get_by_id(id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !moved && current.status != PaymentStatus::Canceled {
            return Err(AppError::Conflict(
                "Payment status changed, please retry".into(),
            ));
        }

        info!(payment_id = %id, from = %payment.status, "Payment canceled");

        // An unpaid attempt must not be charged later.
        if moved && payment.status == PaymentStatus::Pending {
            if let Some(subscription_id) = &payment.stripe_subscription_id {
                let subscription_id = SubscriptionId::new(subscription_id.clone());
                if let Err(e) = self.billing.cancel_subscription(&subscription_id).await {
                    warn!(payment_id = %id, %subscription_id, error = %e, "Upstream cancel failed");
                }
            }
        }
        Ok(current)
    }
}

/// Hide other couples' payments behind NotFound.
fn ensure_visible(principal: Principal, payment: &PaymentProfile) -> AppResult<()> {
    if principal.is_admin()
        || principal.couple_id == Some(payment.couple_id)
        || principal.user_id == payment.user_id
    {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}
