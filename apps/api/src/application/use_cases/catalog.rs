use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{BillingProviderPort, PriceRequest},
        principal::Principal,
    },
    domain::entities::{
        plan_duration::PlanDuration,
        pricing::{discounted_price_cents, validate_discount},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait PlanRepo: Send + Sync {
    async fn create(&self, input: &NewPlan) -> AppResult<SubscriptionPlanProfile>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlanProfile>>;

    async fn list(&self, include_inactive: bool) -> AppResult<Vec<SubscriptionPlanProfile>>;

    /// Replace the mutable columns of a plan.
    async fn update(&self, id: Uuid, plan: &NewPlan) -> AppResult<SubscriptionPlanProfile>;

    async fn set_active(&self, id: Uuid, is_active: bool) -> AppResult<()>;
}

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubscriptionPlanProfile {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub duration: PlanDuration,
    pub is_discounted: bool,
    pub discount_percent: Option<f64>,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlanProfile {
    /// Amount actually charged per period.
    pub fn final_price_cents(&self) -> i64 {
        let pct = if self.is_discounted {
            self.discount_percent
        } else {
            None
        };
        discounted_price_cents(self.price_cents, pct)
    }
}

/// Column values for creating or rewriting a plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub duration: PlanDuration,
    pub is_discounted: bool,
    pub discount_percent: Option<f64>,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePlanInput {
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration: PlanDuration,
    pub is_discounted: bool,
    pub discount_percent: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePlanInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub duration: Option<PlanDuration>,
    pub is_discounted: Option<bool>,
    pub discount_percent: Option<f64>,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct CatalogUseCases {
    plan_repo: Arc<dyn PlanRepo>,
    billing: Arc<dyn BillingProviderPort>,
    currency: String,
}

impl CatalogUseCases {
    pub fn new(
        plan_repo: Arc<dyn PlanRepo>,
        billing: Arc<dyn BillingProviderPort>,
        currency: String,
    ) -> Self {
        Self {
            plan_repo,
            billing,
            currency,
        }
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_plan(
        &self,
        principal: Principal,
        input: CreatePlanInput,
    ) -> AppResult<SubscriptionPlanProfile> {
        principal.require_admin()?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::InvalidInput("Title is required".into()));
        }
        if input.price_cents < 0 {
            return Err(AppError::InvalidInput("Price cannot be negative".into()));
        }
        let discount_percent = validate_discount(input.is_discounted, input.discount_percent)
            .map_err(AppError::InvalidInput)?;

        let mut plan = NewPlan {
            title,
            description: input.description,
            price_cents: input.price_cents,
            currency: self.currency.clone(),
            duration: input.duration,
            is_discounted: discount_percent.is_some(),
            discount_percent,
            stripe_product_id: None,
            stripe_price_id: None,
        };

        if let Some(interval) = plan.duration.billing_interval() {
            let product_id = self
                .billing
                .create_product(&plan.title, plan.description.as_deref())
                .await?;
            let price_id = self
                .billing
                .create_price(PriceRequest {
                    product_id: &product_id,
                    unit_amount_cents: discounted_price_cents(plan.price_cents, discount_percent),
                    currency: &plan.currency,
                    interval,
                })
                .await?;
            plan.stripe_product_id = Some(product_id);
            plan.stripe_price_id = Some(price_id);
        }

        let created = self.plan_repo.create(&plan).await?;
        info!(plan_id = %created.id, duration = %created.duration, "Plan created");
        Ok(created)
    }

    /// Admins see every plan; everyone else only active ones.
    pub async fn list_plans(&self, principal: Principal) -> AppResult<Vec<SubscriptionPlanProfile>> {
        self.plan_repo.list(principal.is_admin()).await
    }

    pub async fn get_plan(
        &self,
        principal: Principal,
        id: Uuid,
    ) -> AppResult<SubscriptionPlanProfile> {
        let plan = self
            .plan_repo
            .get_by_id(id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !plan.is_active && !principal.is_admin() {
            return Err(AppError::NotFound);
        }
        Ok(plan)
    }

    /// Apply a partial update.
    ///
    /// Upstream prices are immutable, so any change to the charged amount or the
    /// interval creates a new price and swaps the stored handle. The old price is
    /// left in place upstream.
    #[instrument(skip(self, input))]
    pub async fn update_plan(
        &self,
        principal: Principal,
        id: Uuid,
        input: UpdatePlanInput,
    ) -> AppResult<SubscriptionPlanProfile> {
        principal.require_admin()?;

        let current = self
            .plan_repo
            .get_by_id(id)
            .await?
            .ok_or(AppError::NotFound)?;

        let title = match input.title {
            Some(t) if t.trim().is_empty() => {
                return Err(AppError::InvalidInput("Title is required".into()));
            }
            Some(t) => t.trim().to_string(),
            None => current.title.clone(),
        };
        let description = input.description.or_else(|| current.description.clone());
        let price_cents = input.price_cents.unwrap_or(current.price_cents);
        if price_cents < 0 {
            return Err(AppError::InvalidInput("Price cannot be negative".into()));
        }
        let duration = input.duration.unwrap_or(current.duration);
        let is_discounted = input.is_discounted.unwrap_or(current.is_discounted);
        let discount_percent = validate_discount(
            is_discounted,
            input.discount_percent.or(current.discount_percent),
        )
        .map_err(AppError::InvalidInput)?;

        let mut plan = NewPlan {
            title,
            description,
            price_cents,
            currency: current.currency.clone(),
            duration,
            is_discounted: discount_percent.is_some(),
            discount_percent,
            stripe_product_id: current.stripe_product_id.clone(),
            stripe_price_id: current.stripe_price_id.clone(),
        };

        match plan.duration.billing_interval() {
            None => {
                plan.stripe_price_id = None;
            }
            Some(interval) => {
                let product_id = match &plan.stripe_product_id {
                    Some(product_id) => {
                        if plan.title != current.title || plan.description != current.description {
                            self.billing
                                .update_product(product_id, &plan.title, plan.description.as_deref())
                                .await?;
                        }
                        product_id.clone()
                    }
                    None => {
                        self.billing
                            .create_product(&plan.title, plan.description.as_deref())
                            .await?
                    }
                };

                let new_amount = discounted_price_cents(plan.price_cents, plan.discount_percent);
                let price_changed = new_amount != current.final_price_cents()
                    || plan.duration != current.duration
                    || plan.stripe_price_id.is_none();

                if price_changed {
                    let price_id = self
                        .billing
                        .create_price(PriceRequest {
                            product_id: &product_id,
                            unit_amount_cents: new_amount,
                            currency: &plan.currency,
                            interval,
                        })
                        .await?;
                    info!(plan_id = %id, %price_id, "Replaced upstream price");
                    plan.stripe_price_id = Some(price_id);
                }
                plan.stripe_product_id = Some(product_id);
            }
        }

        self.plan_repo.update(id, &plan).await
    }

    /// Plans that were ever sold are never removed, only hidden.
    #[instrument(skip(self))]
    pub async fn soft_delete_plan(&self, principal: Principal, id: Uuid) -> AppResult<()> {
        principal.require_admin()?;

        if self.plan_repo.get_by_id(id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        self.plan_repo.set_active(id, false).await
    }
}
