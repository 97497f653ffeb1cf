//! Applies billing provider webhook events to payments and couple windows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        auth::UserRepo,
        catalog::PlanRepo,
        payment::{NewPayment, PaymentProfile, PaymentRepo},
    },
    domain::entities::{
        billing_event::BillingEventKind, payment_status::PaymentStatus,
        subscription_window::SubscriptionWindow,
    },
};

/// Invoices with this reason are the first charge of a purchase, which the
/// payment intent events already cover.
const FIRST_INVOICE_REASON: &str = "subscription_create";

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait BillingLedgerRepo: Send + Sync {
    async fn is_event_processed(&self, event_id: &str) -> AppResult<bool>;

    /// Mark an event handled without touching any other state.
    async fn record_event(&self, event_id: &str, event_type: &str) -> AppResult<()>;

    /// Apply all writes of one event in a single transaction.
    ///
    /// Returns false and writes nothing when the event id was already
    /// recorded, the payment is no longer in `from`, or the renewal invoice
    /// already has a row.
    async fn apply(&self, write: &LedgerWrite) -> AppResult<bool>;
}

// ============================================================================
// Ledger Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct LedgerWrite {
    pub event_id: String,
    pub event_type: String,
    pub couple_id: Uuid,
    pub payment: Option<PaymentTransition>,
    pub renewal: Option<NewPayment>,
    pub window: WindowWrite,
}

/// Compare-and-set on a payment's status. Handles are only filled in, never
/// overwritten.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub payment_id: Uuid,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
}

/// Change to the window mirrored on every member of a couple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowWrite {
    Keep,
    Set {
        plan_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Move the end forward to `end`, never backward.
    Extend { plan_id: Uuid, end: DateTime<Utc> },
    /// Overwrite the end of an existing window.
    SyncEnd { end: DateTime<Utc> },
    /// Drop the window and the plan link.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    /// The event id was seen before.
    Duplicate,
    /// State already reflects what the event would produce.
    AlreadyApplied,
    /// No local payment matches the event's handle.
    MissingRecord,
    /// Unknown or irrelevant event type.
    Ignored,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::AlreadyApplied => "already_applied",
            ReconcileOutcome::MissingRecord => "missing_record",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

/// A verified provider event.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub event_type: String,
    pub object: JsonValue,
}

impl BillingEvent {
    pub fn from_json(payload: &JsonValue) -> AppResult<Self> {
        let id = payload["id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Webhook event has no id".into()))?;
        let event_type = payload["type"]
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("Webhook event has no type".into()))?;

        Ok(Self {
            id: id.to_string(),
            event_type: event_type.to_string(),
            object: payload["data"]["object"].clone(),
        })
    }

    fn object_str(&self, field: &str) -> Option<&str> {
        self.object[field].as_str().filter(|s| !s.is_empty())
    }
}

/// Whether a failed event is worth the provider retrying.
pub fn is_retryable_error(error: &AppError) -> bool {
    match error {
        AppError::Database(_) | AppError::Internal(_) => true,
        AppError::NotFound
        | AppError::InvalidInput(_)
        | AppError::Conflict(_)
        | AppError::Forbidden
        | AppError::InvalidCredentials
        | AppError::AccountSuspended => false,
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
}

/// Subscription handle of an invoice, across API versions.
fn invoice_subscription(invoice: &JsonValue) -> Option<&str> {
    invoice["subscription"]
        .as_str()
        .or_else(|| invoice["parent"]["subscription_details"]["subscription"].as_str())
}

/// End of the billed period: first line item, then the invoice itself.
fn invoice_period_end(invoice: &JsonValue) -> Option<DateTime<Utc>> {
    timestamp(
        invoice["lines"]["data"][0]["period"]["end"]
            .as_i64()
            .or_else(|| invoice["period_end"].as_i64()),
    )
}

/// Current period end of a subscription, across API versions.
fn subscription_period_end(subscription: &JsonValue) -> Option<DateTime<Utc>> {
    timestamp(
        subscription["current_period_end"]
            .as_i64()
            .or_else(|| subscription["items"]["data"][0]["current_period_end"].as_i64()),
    )
}

/// What an event resolves to before anything is written.
enum Decision {
    Write(LedgerWrite),
    Skip(ReconcileOutcome),
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PaymentReconciler {
    ledger: Arc<dyn BillingLedgerRepo>,
    payment_repo: Arc<dyn PaymentRepo>,
    plan_repo: Arc<dyn PlanRepo>,
    user_repo: Arc<dyn UserRepo>,
}

impl PaymentReconciler {
    pub fn new(
        ledger: Arc<dyn BillingLedgerRepo>,
        payment_repo: Arc<dyn PaymentRepo>,
        plan_repo: Arc<dyn PlanRepo>,
        user_repo: Arc<dyn UserRepo>,
    ) -> Self {
        Self {
            ledger,
            payment_repo,
            plan_repo,
            user_repo,
        }
    }

    /// Apply one event. Safe under redelivery and any ordering.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn reconcile(&self, event: &BillingEvent) -> AppResult<ReconcileOutcome> {
        if self.ledger.is_event_processed(&event.id).await? {
            debug!("Event already processed");
            return Ok(ReconcileOutcome::Duplicate);
        }

        let Some(kind) = BillingEventKind::parse(&event.event_type) else {
            debug!("Ignoring unhandled event type");
            self.ledger.record_event(&event.id, &event.event_type).await?;
            return Ok(ReconcileOutcome::Ignored);
        };

        let decision = match kind {
            BillingEventKind::PaymentIntentSucceeded => self.payment_intent_succeeded(event).await?,
            BillingEventKind::PaymentIntentFailed => self.payment_intent_failed(event).await?,
            BillingEventKind::InvoicePaid => {
                self.invoice_settled(event, PaymentStatus::Success).await?
            }
            BillingEventKind::InvoicePaymentFailed => {
                self.invoice_settled(event, PaymentStatus::Failed).await?
            }
            BillingEventKind::SubscriptionDeleted => self.subscription_deleted(event).await?,
            BillingEventKind::SubscriptionUpdated => self.subscription_updated(event).await?,
            BillingEventKind::CheckoutSessionCompleted => {
                self.checkout_session(event, PaymentStatus::Success).await?
            }
            BillingEventKind::CheckoutSessionExpired => {
                self.checkout_session(event, PaymentStatus::Canceled).await?
            }
        };

        match decision {
            Decision::Write(write) => {
                if self.ledger.apply(&write).await? {
                    info!(couple_id = %write.couple_id, window = ?write.window, "Billing event applied");
                    Ok(ReconcileOutcome::Applied)
                } else {
                    debug!("Billing event lost a race, nothing written");
                    Ok(ReconcileOutcome::AlreadyApplied)
                }
            }
            Decision::Skip(ReconcileOutcome::MissingRecord) => {
                // Not recorded, so a later redelivery can still apply once the row exists.
                warn!("No local payment for billing event");
                Ok(ReconcileOutcome::MissingRecord)
            }
            Decision::Skip(outcome) => {
                debug!(outcome = outcome.as_str(), "Billing event needs no writes");
                self.ledger.record_event(&event.id, &event.event_type).await?;
                Ok(outcome)
            }
        }
    }

    fn write(
        event: &BillingEvent,
        couple_id: Uuid,
        payment: Option<PaymentTransition>,
        renewal: Option<NewPayment>,
        window: WindowWrite,
    ) -> Decision {
        Decision::Write(LedgerWrite {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            couple_id,
            payment,
            renewal,
            window,
        })
    }

    /// Window opened by a first successful charge, starting now.
    async fn opening_window(&self, payment: &PaymentProfile) -> AppResult<WindowWrite> {
        let plan = self
            .plan_repo
            .get_by_id(payment.plan_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Plan {} not found", payment.plan_id)))?;

        Ok(
            match SubscriptionWindow::starting_at(Utc::now(), plan.duration) {
                Some(window) => WindowWrite::Set {
                    plan_id: plan.id,
                    start: window.start,
                    end: window.end,
                },
                None => WindowWrite::Keep,
            },
        )
    }

    async fn payment_intent_succeeded(&self, event: &BillingEvent) -> AppResult<Decision> {
        let Some(intent_id) = event.object_str("id") else {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        };
        let Some(payment) = self.payment_repo.find_by_payment_intent(intent_id).await? else {
            return Ok(Decision::Skip(ReconcileOutcome::MissingRecord));
        };
        if payment.status != PaymentStatus::Pending {
            if payment.status == PaymentStatus::Canceled {
                warn!(
                    payment_id = %payment.id,
                    couple_id = %payment.couple_id,
                    intent_id,
                    "Charge succeeded for a canceled payment, refund needed"
                );
            }
            return Ok(Decision::Skip(ReconcileOutcome::AlreadyApplied));
        }

        let window = self.opening_window(&payment).await?;
        Ok(Self::write(
            event,
            payment.couple_id,
            Some(PaymentTransition {
                payment_id: payment.id,
                from: PaymentStatus::Pending,
                to: PaymentStatus::Success,
                stripe_subscription_id: None,
                stripe_customer_id: None,
                stripe_payment_intent_id: None,
            }),
            None,
            window,
        ))
    }

    async fn payment_intent_failed(&self, event: &BillingEvent) -> AppResult<Decision> {
        let Some(intent_id) = event.object_str("id") else {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        };
        let Some(payment) = self.payment_repo.find_by_payment_intent(intent_id).await? else {
            return Ok(Decision::Skip(ReconcileOutcome::MissingRecord));
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(Decision::Skip(ReconcileOutcome::AlreadyApplied));
        }

        let window = if self.couple_has_window(payment.user_id).await?
            && self.is_backed_by_other_payment(&payment).await?
        {
            WindowWrite::Keep
        } else {
            WindowWrite::Clear
        };

        Ok(Self::write(
            event,
            payment.couple_id,
            Some(PaymentTransition {
                payment_id: payment.id,
                from: PaymentStatus::Pending,
                to: PaymentStatus::Failed,
                stripe_subscription_id: None,
                stripe_customer_id: None,
                stripe_payment_intent_id: None,
            }),
            None,
            window,
        ))
    }

    /// Another settled payment may still pay for the couple's window.
    async fn is_backed_by_other_payment(&self, payment: &PaymentProfile) -> AppResult<bool> {
        Ok(self
            .payment_repo
            .latest_success_for_couple(payment.couple_id)
            .await?
            .is_some_and(|p| p.id != payment.id))
    }

    /// Renewal invoices each get their own payment row, keyed by invoice id.
    async fn invoice_settled(
        &self,
        event: &BillingEvent,
        status: PaymentStatus,
    ) -> AppResult<Decision> {
        let invoice = &event.object;
        if invoice["billing_reason"].as_str() == Some(FIRST_INVOICE_REASON) {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        }
        let (Some(invoice_id), Some(subscription_id)) =
            (event.object_str("id"), invoice_subscription(invoice))
        else {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        };

        if self.payment_repo.find_by_invoice(invoice_id).await?.is_some() {
            return Ok(Decision::Skip(ReconcileOutcome::AlreadyApplied));
        }
        let Some(latest) = self
            .payment_repo
            .latest_by_subscription(subscription_id)
            .await?
        else {
            return Ok(Decision::Skip(ReconcileOutcome::MissingRecord));
        };

        let amount_field = match status {
            PaymentStatus::Success => "amount_paid",
            _ => "amount_due",
        };
        let renewal = NewPayment {
            id: Uuid::new_v4(),
            couple_id: latest.couple_id,
            user_id: latest.user_id,
            plan_id: latest.plan_id,
            amount_cents: invoice[amount_field].as_i64().unwrap_or(latest.amount_cents),
            currency: invoice["currency"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| latest.currency.clone()),
            status,
            stripe_payment_intent_id: None,
            stripe_subscription_id: Some(subscription_id.to_string()),
            stripe_customer_id: invoice["customer"]
                .as_str()
                .map(str::to_string)
                .or_else(|| latest.stripe_customer_id.clone()),
            stripe_session_id: None,
            stripe_invoice_id: Some(invoice_id.to_string()),
        };

        let window = match (status, invoice_period_end(invoice)) {
            (PaymentStatus::Success, Some(end)) => WindowWrite::Extend {
                plan_id: latest.plan_id,
                end,
            },
            _ => WindowWrite::Keep,
        };

        Ok(Self::write(
            event,
            latest.couple_id,
            None,
            Some(renewal),
            window,
        ))
    }

    /// Whether `subscription_id` backs the couple's current paid window.
    async fn is_current_subscription(
        &self,
        couple_id: Uuid,
        subscription_id: &str,
    ) -> AppResult<bool> {
        Ok(self
            .payment_repo
            .latest_success_for_couple(couple_id)
            .await?
            .and_then(|p| p.stripe_subscription_id)
            .is_some_and(|id| id == subscription_id))
    }

    async fn subscription_deleted(&self, event: &BillingEvent) -> AppResult<Decision> {
        let Some(subscription_id) = event.object_str("id") else {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        };
        let Some(latest) = self
            .payment_repo
            .latest_by_subscription(subscription_id)
            .await?
        else {
            return Ok(Decision::Skip(ReconcileOutcome::MissingRecord));
        };

        // Settled payments stay as they are. Only an unpaid attempt is canceled.
        let payment = (latest.status == PaymentStatus::Pending).then(|| PaymentTransition {
            payment_id: latest.id,
            from: PaymentStatus::Pending,
            to: PaymentStatus::Canceled,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            stripe_payment_intent_id: None,
        });

        let window = if self
            .is_current_subscription(latest.couple_id, subscription_id)
            .await?
            && self.couple_has_window(latest.user_id).await?
        {
            WindowWrite::Clear
        } else {
            WindowWrite::Keep
        };

        if payment.is_none() && window == WindowWrite::Keep {
            return Ok(Decision::Skip(ReconcileOutcome::AlreadyApplied));
        }
        Ok(Self::write(event, latest.couple_id, payment, None, window))
    }

    async fn subscription_updated(&self, event: &BillingEvent) -> AppResult<Decision> {
        let (Some(subscription_id), Some(end)) = (
            event.object_str("id"),
            subscription_period_end(&event.object),
        ) else {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        };
        let Some(latest) = self
            .payment_repo
            .latest_by_subscription(subscription_id)
            .await?
        else {
            return Ok(Decision::Skip(ReconcileOutcome::MissingRecord));
        };

        if latest.status != PaymentStatus::Success
            || !self
                .is_current_subscription(latest.couple_id, subscription_id)
                .await?
        {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        }

        let member = self.user_repo.get_by_id(latest.user_id).await?;
        match member.and_then(|u| u.subscription_end) {
            Some(current) if current == end => {
                Ok(Decision::Skip(ReconcileOutcome::AlreadyApplied))
            }
            Some(_) => Ok(Self::write(
                event,
                latest.couple_id,
                None,
                None,
                WindowWrite::SyncEnd { end },
            )),
            // A cleared window is not reopened by a period change.
            None => Ok(Decision::Skip(ReconcileOutcome::Ignored)),
        }
    }

    async fn checkout_session(
        &self,
        event: &BillingEvent,
        to: PaymentStatus,
    ) -> AppResult<Decision> {
        let Some(session_id) = event.object_str("id") else {
            return Ok(Decision::Skip(ReconcileOutcome::Ignored));
        };

        let found = match self.payment_repo.get_by_session(session_id).await? {
            Some(payment) => Some(payment),
            None => match event
                .object_str("client_reference_id")
                .and_then(|r| Uuid::parse_str(r).ok())
            {
                Some(payment_id) => self.payment_repo.get_by_id(payment_id).await?,
                None => None,
            },
        };
        let Some(payment) = found else {
            return Ok(Decision::Skip(ReconcileOutcome::MissingRecord));
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(Decision::Skip(ReconcileOutcome::AlreadyApplied));
        }

        let window = match to {
            PaymentStatus::Success => self.opening_window(&payment).await?,
            _ => WindowWrite::Keep,
        };

        Ok(Self::write(
            event,
            payment.couple_id,
            Some(PaymentTransition {
                payment_id: payment.id,
                from: PaymentStatus::Pending,
                to,
                stripe_subscription_id: event.object_str("subscription").map(str::to_string),
                stripe_customer_id: event.object_str("customer").map(str::to_string),
                stripe_payment_intent_id: event.object_str("payment_intent").map(str::to_string),
            }),
            None,
            window,
        ))
    }

    async fn couple_has_window(&self, member_id: Uuid) -> AppResult<bool> {
        Ok(self
            .user_repo
            .get_by_id(member_id)
            .await?
            .is_some_and(|u| u.subscription_end.is_some() || u.subscription_plan_id.is_some()))
    }
}
