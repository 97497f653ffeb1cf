use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{
            BillingProviderPort, CheckoutUrls, CustomerId, CustomerRequest, SubscriptionId,
        },
        principal::Principal,
        use_cases::{
            auth::{UserProfile, UserRepo},
            catalog::{PlanRepo, SubscriptionPlanProfile},
            payment::{NewPayment, PaymentProfile, PaymentRepo},
        },
    },
    domain::entities::{
        payment_status::PaymentStatus,
        subscription_window::{has_active_window, remaining_days},
    },
};

/// Returned to the client so it can confirm the first charge (3-D Secure).
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseConfirmation {
    pub payment_id: Uuid,
    pub subscription_id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutStarted {
    pub payment_id: Uuid,
    pub session_id: String,
    pub url: Option<String>,
}

/// The couple's current window as seen by one member.
#[derive(Debug, Clone)]
pub struct MySubscription {
    pub plan: Option<SubscriptionPlanProfile>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub remaining_days: i64,
    pub partner: Option<UserProfile>,
}

/// Everything a purchase needs, checked before any provider call.
struct PurchaseContext {
    user: UserProfile,
    couple_id: Uuid,
    plan: SubscriptionPlanProfile,
    price_id: String,
    /// Unsettled attempt of the couple, at most one.
    pending: Option<PaymentProfile>,
}

impl PurchaseContext {
    /// Only the member who started an attempt may resume it, for the same plan.
    fn ensure_no_other_attempt(&self, resumable: bool) -> AppResult<()> {
        match &self.pending {
            Some(open)
                if resumable
                    && open.user_id == self.user.id
                    && open.plan_id == self.plan.id
                    && open.stripe_subscription_id.is_some() =>
            {
                Ok(())
            }
            Some(_) => Err(AppError::Conflict(
                "A purchase is already in progress for your couple".into(),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionUseCases {
    user_repo: Arc<dyn UserRepo>,
    plan_repo: Arc<dyn PlanRepo>,
    payment_repo: Arc<dyn PaymentRepo>,
    billing: Arc<dyn BillingProviderPort>,
    app_origin: String,
    tx_timeout: Duration,
    dual_cancel: bool,
}

impl SubscriptionUseCases {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        plan_repo: Arc<dyn PlanRepo>,
        payment_repo: Arc<dyn PaymentRepo>,
        billing: Arc<dyn BillingProviderPort>,
        app_origin: String,
        tx_timeout: Duration,
        dual_cancel: bool,
    ) -> Self {
        Self {
            user_repo,
            plan_repo,
            payment_repo,
            billing,
            app_origin,
            tx_timeout,
            dual_cancel,
        }
    }

    /// Buy `plan_id` for the caller's couple with a stored payment method.
    ///
    /// Leaves the payment PENDING. The window is opened by the reconciler once
    /// the provider reports the first charge as paid.
    #[instrument(skip(self, payment_method_id))]
    pub async fn purchase(
        &self,
        principal: Principal,
        plan_id: Uuid,
        payment_method_id: &str,
    ) -> AppResult<PurchaseConfirmation> {
        tokio::time::timeout(
            self.tx_timeout,
            self.purchase_inner(principal, plan_id, payment_method_id),
        )
        .await
        .map_err(|_| {
            warn!(user_id = %principal.user_id, %plan_id, "Purchase timed out");
            AppError::Internal("Purchase timed out".into())
        })?
    }

    async fn purchase_inner(
        &self,
        principal: Principal,
        plan_id: Uuid,
        payment_method_id: &str,
    ) -> AppResult<PurchaseConfirmation> {
        let payment_method_id = payment_method_id.trim();
        let ctx = self.load_purchase_context(principal, plan_id).await?;
        if payment_method_id.is_empty() {
            return Err(AppError::InvalidInput("Payment method is required".into()));
        }
        ctx.ensure_no_other_attempt(true)?;

        // Each provider step depends on the state left by the previous one.
        let customer_id = self.ensure_customer(&ctx.user).await?;
        self.billing
            .attach_default_payment_method(&customer_id, payment_method_id)
            .await?;

        let idempotency_key = self
            .purchase_key(ctx.couple_id, ctx.plan.id, payment_method_id)
            .await?;
        let created = self
            .billing
            .create_subscription(&customer_id, &ctx.price_id, &idempotency_key)
            .await?;

        let payment_intent_id = created.payment_intent_id.clone().ok_or_else(|| {
            AppError::Internal("Billing provider returned no payment intent".into())
        })?;

        let stored = self
            .payment_repo
            .upsert_purchase(&NewPayment {
                id: Uuid::new_v4(),
                couple_id: ctx.couple_id,
                user_id: ctx.user.id,
                plan_id: ctx.plan.id,
                amount_cents: ctx.plan.final_price_cents(),
                currency: ctx.plan.currency.clone(),
                status: PaymentStatus::Pending,
                stripe_payment_intent_id: Some(payment_intent_id),
                stripe_subscription_id: Some(created.subscription_id.as_str().to_string()),
                stripe_customer_id: Some(customer_id.as_str().to_string()),
                stripe_session_id: None,
                stripe_invoice_id: None,
            })
            .await;

        let payment = match stored {
            Ok(payment) if payment.status == PaymentStatus::Pending => payment,
            Ok(payment) => {
                warn!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "Purchase replayed an attempt that already settled"
                );
                return Err(AppError::Conflict(
                    "The previous attempt has just settled, please retry".into(),
                ));
            }
            Err(AppError::Conflict(msg)) => {
                // A partner's attempt won the race; this subscription is orphaned.
                self.cancel_subscription_quietly(ctx.couple_id, &created.subscription_id)
                    .await;
                return Err(AppError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };

        info!(
            payment_id = %payment.id,
            couple_id = %ctx.couple_id,
            subscription_id = %created.subscription_id,
            "Purchase started"
        );

        Ok(PurchaseConfirmation {
            payment_id: payment.id,
            subscription_id: created.subscription_id.0,
            client_secret: created.client_secret,
            status: created.status,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
        })
    }

    /// Hosted checkout alternative to `purchase`.
    #[instrument(skip(self))]
    pub async fn start_checkout(
        &self,
        principal: Principal,
        plan_id: Uuid,
    ) -> AppResult<CheckoutStarted> {
        tokio::time::timeout(self.tx_timeout, self.start_checkout_inner(principal, plan_id))
            .await
            .map_err(|_| {
                warn!(user_id = %principal.user_id, %plan_id, "Checkout timed out");
                AppError::Internal("Checkout timed out".into())
            })?
    }

    async fn start_checkout_inner(
        &self,
        principal: Principal,
        plan_id: Uuid,
    ) -> AppResult<CheckoutStarted> {
        let ctx = self.load_purchase_context(principal, plan_id).await?;
        ctx.ensure_no_other_attempt(false)?;
        let customer_id = self.ensure_customer(&ctx.user).await?;

        let payment_id = Uuid::new_v4();
        let origin = self.app_origin.trim_end_matches('/');
        let urls = CheckoutUrls {
            success_url: format!("{origin}/payment/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{origin}/payment/cancel"),
        };

        let session = self
            .billing
            .create_checkout_session(
                &customer_id,
                &ctx.price_id,
                &payment_id.to_string(),
                &urls,
            )
            .await?;

        self.payment_repo
            .create(&NewPayment {
                id: payment_id,
                couple_id: ctx.couple_id,
                user_id: ctx.user.id,
                plan_id: ctx.plan.id,
                amount_cents: ctx.plan.final_price_cents(),
                currency: ctx.plan.currency.clone(),
                status: PaymentStatus::Pending,
                stripe_payment_intent_id: None,
                stripe_subscription_id: None,
                stripe_customer_id: Some(customer_id.as_str().to_string()),
                stripe_session_id: Some(session.session_id.clone()),
                stripe_invoice_id: None,
            })
            .await?;

        info!(%payment_id, session_id = %session.session_id, "Checkout session created");

        Ok(CheckoutStarted {
            payment_id,
            session_id: session.session_id,
            url: session.url,
        })
    }

    /// Clear the couple's window on both members.
    #[instrument(skip(self))]
    pub async fn cancel(&self, principal: Principal) -> AppResult<()> {
        let user = self
            .user_repo
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let couple_id = match user.couple_id {
            Some(couple_id) if has_active_window(user.subscription_end, Utc::now()) => couple_id,
            _ => {
                return Err(AppError::InvalidInput(
                    "No active subscription to cancel".into(),
                ));
            }
        };

        let cleared = self.user_repo.clear_window_for_couple(couple_id).await?;
        info!(%couple_id, members = cleared, "Subscription canceled");

        if self.dual_cancel {
            self.cancel_upstream(couple_id).await;
        }
        Ok(())
    }

    pub async fn my_subscription(&self, principal: Principal) -> AppResult<MySubscription> {
        let user = self
            .user_repo
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let plan = match user.subscription_plan_id {
            Some(plan_id) => self.plan_repo.get_by_id(plan_id).await?,
            None => None,
        };
        let partner = match user.couple_id {
            Some(couple_id) => self.user_repo.get_partner(user.id, couple_id).await?,
            None => None,
        };

        let now = Utc::now();
        Ok(MySubscription {
            plan,
            start: user.subscription_start,
            end: user.subscription_end,
            is_active: has_active_window(user.subscription_end, now),
            remaining_days: user
                .subscription_end
                .map(|end| remaining_days(end, now))
                .unwrap_or(0),
            partner,
        })
    }

    async fn load_purchase_context(
        &self,
        principal: Principal,
        plan_id: Uuid,
    ) -> AppResult<PurchaseContext> {
        let user = self
            .user_repo
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let couple_id = user.couple_id.ok_or_else(|| {
            AppError::InvalidInput("Connect with your partner before subscribing".into())
        })?;

        if has_active_window(user.subscription_end, Utc::now()) {
            return Err(AppError::Conflict(
                "Your couple already has an active subscription".into(),
            ));
        }

        let plan = self
            .plan_repo
            .get_by_id(plan_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(AppError::NotFound)?;

        if plan.duration.is_free() {
            return Err(AppError::InvalidInput(
                "Free plans do not need to be purchased".into(),
            ));
        }

        let price_id = plan
            .stripe_price_id
            .clone()
            .ok_or_else(|| AppError::Internal("Plan has no billing price configured".into()))?;

        let pending = self.payment_repo.pending_attempt_for_couple(couple_id).await?;

        Ok(PurchaseContext {
            user,
            couple_id,
            plan,
            price_id,
            pending,
        })
    }

    /// Stable while an attempt is open, new once the couple's last attempt settles.
    async fn purchase_key(
        &self,
        couple_id: Uuid,
        plan_id: Uuid,
        payment_method_id: &str,
    ) -> AppResult<String> {
        let after = match self
            .payment_repo
            .latest_settled_attempt_for_couple(couple_id)
            .await?
        {
            Some(settled) => settled.id.to_string(),
            None => "first".to_string(),
        };
        Ok(format!(
            "purchase-{couple_id}-{plan_id}-{payment_method_id}-after-{after}"
        ))
    }

    /// Reuse the stored customer, or create one and persist it.
    ///
    /// If two requests race, the repo keeps the first stored id.
    async fn ensure_customer(&self, user: &UserProfile) -> AppResult<CustomerId> {
        if let Some(existing) = &user.stripe_customer_id {
            return Ok(CustomerId::new(existing.clone()));
        }

        let created = self
            .billing
            .ensure_customer(&CustomerRequest {
                user_id: user.id,
                email: user.email.clone(),
                name: user.full_name.clone(),
            })
            .await?;

        let stored = self
            .user_repo
            .save_stripe_customer_id(user.id, created.as_str())
            .await?;
        Ok(CustomerId::new(stored))
    }

    async fn cancel_upstream(&self, couple_id: Uuid) {
        let latest = match self.payment_repo.latest_success_for_couple(couple_id).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(%couple_id, error = %e, "Could not look up subscription to cancel upstream");
                return;
            }
        };

        let Some(subscription_id) = latest.and_then(|p| p.stripe_subscription_id) else {
            return;
        };

        self.cancel_subscription_quietly(couple_id, &SubscriptionId::new(subscription_id))
            .await;
    }

    async fn cancel_subscription_quietly(&self, couple_id: Uuid, subscription_id: &SubscriptionId) {
        if let Err(e) = self.billing.cancel_subscription(subscription_id).await {
            warn!(%couple_id, %subscription_id, error = %e, "Upstream cancel failed");
        }
    }
}
