//! In-memory implementation of every repository port.
//!
//! One store backs all traits so that operations spanning users, couples and
//! payments stay atomic: each trait method holds the single lock for its whole
//! duration, the same way the Postgres adapter holds one transaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        admin::{CoupleDirectoryRepo, CoupleMembers, CouplePage, CoupleQuery, CoupleStatus},
        auth::{NewUser, UserProfile, UserRepo},
        billboard::{BillboardRepo, NewNote, NoteProfile},
        catalog::{NewPlan, PlanRepo, SubscriptionPlanProfile},
        events::{EventChanges, EventProfile, EventRepo, NewEvent},
        pairing::{PairingAttempt, PairingRepo},
        payment::{
            NewPayment, PaymentListItem, PaymentListQuery, PaymentPage, PaymentProfile,
            PaymentRepo, PaymentScope,
        },
        reconciler::{BillingLedgerRepo, LedgerWrite, WindowWrite},
    },
    domain::entities::{
        event_status::EventStatus, payment_status::PaymentStatus, user_role::UserRole,
        user_status::UserStatus,
    },
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserProfile>,
    /// Couples formed through pairing.
    couples: HashSet<Uuid>,
    plans: HashMap<Uuid, SubscriptionPlanProfile>,
    /// Insertion order doubles as creation order.
    payments: Vec<PaymentProfile>,
    events: HashSet<String>,
    calendar: Vec<EventProfile>,
    /// Insertion order doubles as creation order.
    notes: Vec<NoteProfile>,
}

impl State {
    /// Mirrors the partial unique index allowing one open attempt per couple.
    fn has_pending_attempt(&self, input: &NewPayment) -> bool {
        input.status == PaymentStatus::Pending
            && input.stripe_invoice_id.is_none()
            && self.payments.iter().any(|p| {
                p.couple_id == input.couple_id
                    && p.status == PaymentStatus::Pending
                    && p.stripe_invoice_id.is_none()
            })
    }

    fn note(&self, note: &NoteProfile) -> NoteProfile {
        NoteProfile {
            created_by_name: self.users.get(&note.created_by).map(|u| u.full_name.clone()),
            ..note.clone()
        }
    }

    fn list_item(&self, payment: &PaymentProfile) -> PaymentListItem {
        let mut members: Vec<&UserProfile> = self
            .users
            .values()
            .filter(|u| u.couple_id == Some(payment.couple_id) || u.id == payment.user_id)
            .collect();
        members.sort_by_key(|u| (u.created_at, u.id));
        members.dedup_by_key(|u| u.id);

        PaymentListItem {
            payment: payment.clone(),
            plan_title: self.plans.get(&payment.plan_id).map(|p| p.title.clone()),
            customer_name: members
                .iter()
                .map(|u| u.full_name.as_str())
                .collect::<Vec<_>>()
                .join(" & "),
        }
    }
}

fn payment_from(input: &NewPayment) -> PaymentProfile {
    let now = Utc::now();
    PaymentProfile {
        id: input.id,
        couple_id: input.couple_id,
        user_id: input.user_id,
        plan_id: input.plan_id,
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        status: input.status,
        stripe_payment_intent_id: input.stripe_payment_intent_id.clone(),
        stripe_subscription_id: input.stripe_subscription_id.clone(),
        stripe_customer_id: input.stripe_customer_id.clone(),
        stripe_session_id: input.stripe_session_id.clone(),
        stripe_invoice_id: input.stripe_invoice_id.clone(),
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct InMemoryPersistence {
    state: Mutex<State>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<UserProfile>) -> Self {
        let store = Self::new();
        for user in users {
            store.insert_user(user);
        }
        store
    }

    pub fn with_plans(self, plans: Vec<SubscriptionPlanProfile>) -> Self {
        for plan in plans {
            self.insert_plan(plan);
        }
        self
    }

    pub fn with_payments(self, payments: Vec<PaymentProfile>) -> Self {
        for payment in payments {
            self.insert_payment(payment);
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert_user(&self, user: UserProfile) {
        self.lock().users.insert(user.id, user);
    }

    pub fn insert_plan(&self, plan: SubscriptionPlanProfile) {
        self.lock().plans.insert(plan.id, plan);
    }

    pub fn insert_payment(&self, payment: PaymentProfile) {
        self.lock().payments.push(payment);
    }

    pub fn user(&self, id: Uuid) -> Option<UserProfile> {
        self.lock().users.get(&id).cloned()
    }

    pub fn plan(&self, id: Uuid) -> Option<SubscriptionPlanProfile> {
        self.lock().plans.get(&id).cloned()
    }

    pub fn payment(&self, id: Uuid) -> Option<PaymentProfile> {
        self.lock().payments.iter().find(|p| p.id == id).cloned()
    }

    pub fn set_payment_status(&self, id: Uuid, status: PaymentStatus) {
        if let Some(payment) = self.lock().payments.iter_mut().find(|p| p.id == id) {
            payment.status = status;
            payment.updated_at = Utc::now();
        }
    }

    pub fn payment_count(&self) -> usize {
        self.lock().payments.len()
    }

    pub fn payments_with_status(&self, status: PaymentStatus) -> usize {
        self.lock()
            .payments
            .iter()
            .filter(|p| p.status == status)
            .count()
    }

    /// Couples created through pairing, not those seeded by fixtures.
    pub fn couple_count(&self) -> usize {
        self.lock().couples.len()
    }

    pub fn couple_members(&self, couple_id: Uuid) -> Vec<UserProfile> {
        self.lock()
            .users
            .values()
            .filter(|u| u.couple_id == Some(couple_id))
            .cloned()
            .collect()
    }

    pub fn is_event_recorded(&self, event_id: &str) -> bool {
        self.lock().events.contains(event_id)
    }

    pub fn recorded_event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Calendar events, soft-deleted ones included.
    pub fn event_count(&self) -> usize {
        self.lock().calendar.len()
    }
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserRepo for InMemoryPersistence {
    async fn create(&self, input: &NewUser) -> AppResult<UserProfile> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.email == input.email) {
            return Err(AppError::Conflict("User already exists".into()));
        }

        let user = UserProfile {
            id: Uuid::new_v4(),
            email: input.email.clone(),
            full_name: input.full_name.clone(),
            password_hash: input.password_hash.clone(),
            role: input.role,
            status: UserStatus::Active,
            is_email_verified: false,
            otp: Some(input.otp.clone()),
            otp_expires_at: Some(input.otp_expires_at),
            invite_code: Some(input.invite_code.clone()),
            is_connected: false,
            couple_id: None,
            subscription_plan_id: None,
            subscription_start: None,
            subscription_end: None,
            stripe_customer_id: None,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.user(id))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<UserProfile>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn get_partner(&self, user_id: Uuid, couple_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.couple_id == Some(couple_id) && u.id != user_id)
            .cloned())
    }

    async fn invite_code_exists(&self, code: &str) -> AppResult<bool> {
        Ok(self
            .lock()
            .users
            .values()
            .any(|u| u.invite_code.as_deref() == Some(code)))
    }

    async fn set_otp(
        &self,
        id: Uuid,
        otp: Option<&str>,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut state = self.lock();
        let user = state.users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.otp = otp.map(str::to_string);
        user.otp_expires_at = expires_at;
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.lock();
        let user = state.users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.is_email_verified = true;
        user.otp = None;
        user.otp_expires_at = None;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<()> {
        let mut state = self.lock();
        let user = state.users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.otp = None;
        user.otp_expires_at = None;
        Ok(())
    }

    async fn update_full_name(&self, id: Uuid, full_name: &str) -> AppResult<UserProfile> {
        let mut state = self.lock();
        let user = state.users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.full_name = full_name.to_string();
        Ok(user.clone())
    }

    async fn set_status_for_couple(&self, id: Uuid, status: UserStatus) -> AppResult<u64> {
        let mut state = self.lock();
        let couple_id = state
            .users
            .get(&id)
            .ok_or(AppError::NotFound)?
            .couple_id;

        let mut updated = 0;
        for user in state.users.values_mut() {
            let same_couple = couple_id.is_some() && user.couple_id == couple_id;
            if user.id == id || same_couple {
                user.status = status;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn save_stripe_customer_id(&self, id: Uuid, customer_id: &str) -> AppResult<String> {
        let mut state = self.lock();
        let user = state.users.get_mut(&id).ok_or(AppError::NotFound)?;
        Ok(user
            .stripe_customer_id
            .get_or_insert_with(|| customer_id.to_string())
            .clone())
    }

    async fn clear_window_for_couple(&self, couple_id: Uuid) -> AppResult<u64> {
        let mut state = self.lock();
        let mut updated = 0;
        for user in state
            .users
            .values_mut()
            .filter(|u| u.couple_id == Some(couple_id))
        {
            user.subscription_plan_id = None;
            user.subscription_start = None;
            user.subscription_end = None;
            updated += 1;
        }
        Ok(updated)
    }
}

// ============================================================================
// Pairing
// ============================================================================

#[async_trait]
impl PairingRepo for InMemoryPersistence {
    async fn pair_with_invite_code(
        &self,
        redeemer_id: Uuid,
        code: &str,
    ) -> AppResult<PairingAttempt> {
        let mut state = self.lock();

        let Some(redeemer) = state.users.get(&redeemer_id) else {
            return Ok(PairingAttempt::RedeemerNotFound);
        };
        if redeemer.is_connected || redeemer.couple_id.is_some() {
            return Ok(PairingAttempt::RedeemerConnected);
        }

        let Some(owner) = state
            .users
            .values()
            .find(|u| u.invite_code.as_deref() == Some(code))
        else {
            return Ok(PairingAttempt::CodeNotFound);
        };
        if owner.id == redeemer_id {
            return Ok(PairingAttempt::SelfPairing);
        }
        if owner.is_connected || owner.couple_id.is_some() {
            return Ok(PairingAttempt::CodeOwnerConnected);
        }

        let partner_id = owner.id;
        let couple_id = Uuid::new_v4();
        state.couples.insert(couple_id);
        for id in [redeemer_id, partner_id] {
            if let Some(user) = state.users.get_mut(&id) {
                user.couple_id = Some(couple_id);
                user.is_connected = true;
                user.invite_code = None;
            }
        }

        Ok(PairingAttempt::Paired {
            couple_id,
            partner_id,
        })
    }
}

// ============================================================================
// Plans
// ============================================================================

#[async_trait]
impl PlanRepo for InMemoryPersistence {
    async fn create(&self, input: &NewPlan) -> AppResult<SubscriptionPlanProfile> {
        let now = Utc::now();
        let plan = SubscriptionPlanProfile {
            id: Uuid::new_v4(),
            title: input.title.clone(),
            description: input.description.clone(),
            price_cents: input.price_cents,
            currency: input.currency.clone(),
            duration: input.duration,
            is_discounted: input.is_discounted,
            discount_percent: input.discount_percent,
            stripe_product_id: input.stripe_product_id.clone(),
            stripe_price_id: input.stripe_price_id.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.insert_plan(plan.clone());
        Ok(plan)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlanProfile>> {
        Ok(self.plan(id))
    }

    async fn list(&self, include_inactive: bool) -> AppResult<Vec<SubscriptionPlanProfile>> {
        let mut plans: Vec<SubscriptionPlanProfile> = self
            .lock()
            .plans
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| (p.price_cents, p.created_at));
        Ok(plans)
    }

    async fn update(&self, id: Uuid, input: &NewPlan) -> AppResult<SubscriptionPlanProfile> {
        let mut state = self.lock();
        let plan = state.plans.get_mut(&id).ok_or(AppError::NotFound)?;
        plan.title = input.title.clone();
        plan.description = input.description.clone();
        plan.price_cents = input.price_cents;
        plan.currency = input.currency.clone();
        plan.duration = input.duration;
        plan.is_discounted = input.is_discounted;
        plan.discount_percent = input.discount_percent;
        plan.stripe_product_id = input.stripe_product_id.clone();
        plan.stripe_price_id = input.stripe_price_id.clone();
        plan.updated_at = Utc::now();
        Ok(plan.clone())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> AppResult<()> {
        let mut state = self.lock();
        let plan = state.plans.get_mut(&id).ok_or(AppError::NotFound)?;
        plan.is_active = is_active;
        Ok(())
    }
}

// ============================================================================
// Payments
// ============================================================================

#[async_trait]
impl PaymentRepo for InMemoryPersistence {
    async fn upsert_purchase(&self, input: &NewPayment) -> AppResult<PaymentProfile> {
        let mut state = self.lock();
        if let Some(existing) = state.payments.iter().find(|p| {
            p.stripe_invoice_id.is_none()
                && p.stripe_subscription_id.is_some()
                && p.stripe_subscription_id == input.stripe_subscription_id
        }) {
            return Ok(existing.clone());
        }
        if state.has_pending_attempt(input) {
            return Err(AppError::Conflict("Payment already exists".into()));
        }

        let payment = payment_from(input);
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn create(&self, input: &NewPayment) -> AppResult<PaymentProfile> {
        let mut state = self.lock();
        let duplicate = state.payments.iter().any(|p| {
            p.id == input.id
                || (input.stripe_session_id.is_some()
                    && p.stripe_session_id == input.stripe_session_id)
        });
        if duplicate || state.has_pending_attempt(input) {
            return Err(AppError::Conflict("Payment already exists".into()));
        }

        let payment = payment_from(input);
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentProfile>> {
        Ok(self.payment(id))
    }

    async fn get_by_session(&self, session_id: &str) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.stripe_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.stripe_payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn find_by_invoice(&self, invoice_id: &str) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.stripe_invoice_id.as_deref() == Some(invoice_id))
            .cloned())
    }

    async fn latest_by_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .rev()
            .find(|p| p.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn latest_success_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .rev()
            .find(|p| p.couple_id == couple_id && p.status == PaymentStatus::Success)
            .cloned())
    }

    async fn pending_attempt_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| {
                p.couple_id == couple_id
                    && p.stripe_invoice_id.is_none()
                    && p.status == PaymentStatus::Pending
            })
            .cloned())
    }

    async fn latest_settled_attempt_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .rev()
            .find(|p| {
                p.couple_id == couple_id
                    && p.stripe_invoice_id.is_none()
                    && p.status != PaymentStatus::Pending
            })
            .cloned())
    }

    async fn list(&self, query: &PaymentListQuery) -> AppResult<PaymentPage> {
        let state = self.lock();
        let matching: Vec<&PaymentProfile> = state
            .payments
            .iter()
            .rev()
            .filter(|p| match query.scope {
                PaymentScope::All => true,
                PaymentScope::Couple(couple_id) => p.couple_id == couple_id,
                PaymentScope::User(user_id) => p.user_id == user_id,
            })
            .filter(|p| query.status.is_none_or(|s| p.status == s))
            .collect();

        let payments = matching
            .iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .map(|p| state.list_item(p))
            .collect();

        Ok(PaymentPage {
            payments,
            total: matching.len() as i64,
        })
    }

    async fn total_revenue_cents(&self) -> AppResult<i64> {
        Ok(self
            .lock()
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Success)
            .map(|p| p.amount_cents)
            .sum())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> AppResult<bool> {
        let mut state = self.lock();
        match state
            .payments
            .iter_mut()
            .find(|p| p.id == id && p.status == from)
        {
            Some(payment) => {
                payment.status = to;
                payment.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Billing ledger
// ============================================================================

#[async_trait]
impl BillingLedgerRepo for InMemoryPersistence {
    async fn is_event_processed(&self, event_id: &str) -> AppResult<bool> {
        Ok(self.is_event_recorded(event_id))
    }

    async fn record_event(&self, event_id: &str, _event_type: &str) -> AppResult<()> {
        self.lock().events.insert(event_id.to_string());
        Ok(())
    }

    async fn apply(&self, write: &LedgerWrite) -> AppResult<bool> {
        let mut state = self.lock();

        // Check every precondition before the first mutation.
        if state.events.contains(&write.event_id) {
            return Ok(false);
        }
        let payment_idx = match &write.payment {
            Some(t) => match state
                .payments
                .iter()
                .position(|p| p.id == t.payment_id && p.status == t.from)
            {
                Some(idx) => Some(idx),
                None => return Ok(false),
            },
            None => None,
        };
        let renewal_exists = write.renewal.as_ref().is_some_and(|renewal| {
            state.payments.iter().any(|p| {
                p.stripe_invoice_id.is_some() && p.stripe_invoice_id == renewal.stripe_invoice_id
            })
        });
        if renewal_exists {
            return Ok(false);
        }

        let now = Utc::now();
        state.events.insert(write.event_id.clone());

        if let (Some(idx), Some(t)) = (payment_idx, &write.payment) {
            let payment = &mut state.payments[idx];
            payment.status = t.to;
            payment.updated_at = now;
            if payment.stripe_subscription_id.is_none() {
                payment.stripe_subscription_id = t.stripe_subscription_id.clone();
            }
            if payment.stripe_customer_id.is_none() {
                payment.stripe_customer_id = t.stripe_customer_id.clone();
            }
            if payment.stripe_payment_intent_id.is_none() {
                payment.stripe_payment_intent_id = t.stripe_payment_intent_id.clone();
            }
        }

        if let Some(renewal) = &write.renewal {
            state.payments.push(payment_from(renewal));
        }

        for user in state
            .users
            .values_mut()
            .filter(|u| u.couple_id == Some(write.couple_id))
        {
            match &write.window {
                WindowWrite::Keep => {}
                WindowWrite::Set {
                    plan_id,
                    start,
                    end,
                } => {
                    user.subscription_plan_id = Some(*plan_id);
                    user.subscription_start = Some(*start);
                    user.subscription_end = Some(*end);
                }
                WindowWrite::Extend { plan_id, end } => {
                    user.subscription_plan_id = Some(*plan_id);
                    user.subscription_start.get_or_insert(now);
                    user.subscription_end = Some(user.subscription_end.map_or(*end, |e| e.max(*end)));
                }
                WindowWrite::SyncEnd { end } => {
                    if user.subscription_end.is_some() {
                        user.subscription_end = Some(*end);
                    }
                }
                WindowWrite::Clear => {
                    user.subscription_plan_id = None;
                    user.subscription_start = None;
                    user.subscription_end = None;
                }
            }
        }

        Ok(true)
    }
}

// ============================================================================
// Events
// ============================================================================

#[async_trait]
impl EventRepo for InMemoryPersistence {
    async fn create(&self, input: &NewEvent) -> AppResult<EventProfile> {
        let now = Utc::now();
        let event = EventProfile {
            id: input.id,
            couple_id: input.couple_id,
            created_by: input.created_by,
            approved_by: None,
            title: input.title.clone(),
            description: input.description.clone(),
            date: input.date,
            time: input.time.clone(),
            location: input.location.clone(),
            lat: input.lat,
            lon: input.lon,
            status: EventStatus::Pending,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.lock().calendar.push(event.clone());
        Ok(event)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<EventProfile>> {
        Ok(self.lock().calendar.iter().find(|e| e.id == id).cloned())
    }

    async fn list_for_couple(&self, couple_id: Uuid) -> AppResult<Vec<EventProfile>> {
        let mut events: Vec<EventProfile> = self
            .lock()
            .calendar
            .iter()
            .filter(|e| e.couple_id == couple_id && !e.is_deleted)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn mark_past(&self, couple_id: Uuid, now: chrono::DateTime<Utc>) -> AppResult<u64> {
        let mut updated = 0;
        for event in self
            .lock()
            .calendar
            .iter_mut()
            .filter(|e| e.couple_id == couple_id && e.date < now && e.status.rolls_over_to_past())
        {
            event.status = EventStatus::Past;
            event.updated_at = Utc::now();
            updated += 1;
        }
        Ok(updated)
    }

    async fn update(&self, id: Uuid, changes: &EventChanges) -> AppResult<EventProfile> {
        let mut state = self.lock();
        let event = state
            .calendar
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(AppError::NotFound)?;

        if let Some(title) = &changes.title {
            event.title = title.clone();
        }
        if let Some(description) = &changes.description {
            event.description = Some(description.clone());
        }
        if let Some(date) = changes.date {
            event.date = date;
        }
        if let Some(time) = &changes.time {
            event.time = Some(time.clone());
        }
        if let Some(location) = &changes.location {
            event.location = Some(location.clone());
        }
        if let Some(lat) = changes.lat {
            event.lat = Some(lat);
        }
        if let Some(lon) = changes.lon {
            event.lon = Some(lon);
        }
        if let Some(status) = changes.status {
            event.status = status;
        }
        if let Some(approved_by) = changes.approved_by {
            event.approved_by = Some(approved_by);
        }
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<EventProfile> {
        let mut state = self.lock();
        let event = state
            .calendar
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(AppError::NotFound)?;
        event.is_deleted = true;
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.lock();
        let before = state.calendar.len();
        state.calendar.retain(|e| e.id != id);
        if state.calendar.len() == before {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

// ============================================================================
// Billboard
// ============================================================================

#[async_trait]
impl BillboardRepo for InMemoryPersistence {
    async fn create(&self, input: &NewNote) -> AppResult<NoteProfile> {
        let mut state = self.lock();
        let now = Utc::now();
        let note = NoteProfile {
            id: input.id,
            couple_id: input.couple_id,
            created_by: input.created_by,
            created_by_name: None,
            title: input.title.clone(),
            description: input.description.clone(),
            created_at: now,
            updated_at: now,
        };
        state.notes.push(note.clone());
        Ok(state.note(&note))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<NoteProfile>> {
        let state = self.lock();
        Ok(state.notes.iter().find(|n| n.id == id).map(|n| state.note(n)))
    }

    async fn list_for_couple(&self, couple_id: Uuid) -> AppResult<Vec<NoteProfile>> {
        let state = self.lock();
        Ok(state
            .notes
            .iter()
            .rev()
            .filter(|n| n.couple_id == couple_id)
            .map(|n| state.note(n))
            .collect())
    }

    async fn update(
        &self,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<NoteProfile> {
        let mut state = self.lock();
        let note = state
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(AppError::NotFound)?;
        if let Some(title) = title {
            note.title = title.to_string();
        }
        if let Some(description) = description {
            note.description = Some(description.to_string());
        }
        note.updated_at = Utc::now();
        let note = note.clone();
        Ok(state.note(&note))
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.lock();
        let before = state.notes.len();
        state.notes.retain(|n| n.id != id);
        if state.notes.len() == before {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

// ============================================================================
// Couple directory
// ============================================================================

#[async_trait]
impl CoupleDirectoryRepo for InMemoryPersistence {
    async fn list_couples(&self, query: &CoupleQuery) -> AppResult<CouplePage> {
        let state = self.lock();

        let mut grouped: HashMap<Uuid, Vec<UserProfile>> = HashMap::new();
        for user in state.users.values() {
            if let Some(couple_id) = user.couple_id {
                grouped.entry(couple_id).or_default().push(user.clone());
            }
        }

        let search = query.search.as_deref().map(str::to_lowercase);
        let mut couples: Vec<CoupleMembers> = grouped
            .into_iter()
            .filter(|(_, members)| {
                members.len() == 2 && members.iter().all(|m| m.role != UserRole::Admin)
            })
            .filter(|(_, members)| {
                search.as_deref().is_none_or(|needle| {
                    members.iter().any(|m| {
                        m.full_name.to_lowercase().contains(needle)
                            || m.email.to_lowercase().contains(needle)
                    })
                })
            })
            .filter(|(_, members)| query.status.is_none_or(|s| CoupleStatus::of(members) == s))
            .map(|(couple_id, mut members)| {
                members.sort_by(|a, b| (&a.full_name, a.id).cmp(&(&b.full_name, b.id)));
                // The couple forms when its second member joins.
                let created_at = members.iter().map(|m| m.created_at).max().unwrap_or_default();
                CoupleMembers {
                    couple_id,
                    created_at,
                    members,
                }
            })
            .collect();
        couples.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.couple_id.cmp(&b.couple_id))
        });

        let total = couples.len() as i64;
        let couples = couples
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(0))
            .collect();
        Ok(CouplePage { couples, total })
    }

    async fn hard_delete_couple(&self, couple_id: Uuid) -> AppResult<Option<Vec<UserProfile>>> {
        let mut state = self.lock();
        let mut members: Vec<UserProfile> = state
            .users
            .values()
            .filter(|u| u.couple_id == Some(couple_id))
            .cloned()
            .collect();
        if members.len() != 2 || members.iter().any(|m| m.role == UserRole::Admin) {
            return Ok(None);
        }
        members.sort_by(|a, b| (&a.full_name, a.id).cmp(&(&b.full_name, b.id)));

        state.users.retain(|_, u| u.couple_id != Some(couple_id));
        state.couples.remove(&couple_id);
        state.payments.retain(|p| p.couple_id != couple_id);
        state.calendar.retain(|e| e.couple_id != couple_id);
        state.notes.retain(|n| n.couple_id != couple_id);
        Ok(Some(members))
    }
}
