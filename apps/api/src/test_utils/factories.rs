//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    application::use_cases::{
        auth::UserProfile, catalog::SubscriptionPlanProfile, pairing::generate_invite_code,
        payment::PaymentProfile,
    },
    domain::entities::{
        payment_status::PaymentStatus, plan_duration::PlanDuration, user_role::UserRole,
        user_status::UserStatus,
    },
};

/// Placeholder hash. Tests that log in hash a real password themselves,
/// since Argon2 is slow.
pub const TEST_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$placeholder$placeholder";

/// Create a verified, unpaired user with a fresh invite code.
pub fn create_test_user(overrides: impl FnOnce(&mut UserProfile)) -> UserProfile {
    let id = Uuid::new_v4();
    let mut user = UserProfile {
        id,
        email: format!("user-{id}@example.com"),
        full_name: "Test User".to_string(),
        password_hash: TEST_PASSWORD_HASH.to_string(),
        role: UserRole::User,
        status: UserStatus::Active,
        is_email_verified: true,
        otp: None,
        otp_expires_at: None,
        invite_code: Some(generate_invite_code()),
        is_connected: false,
        couple_id: None,
        subscription_plan_id: None,
        subscription_start: None,
        subscription_end: None,
        stripe_customer_id: None,
        created_at: Utc::now(),
    };
    overrides(&mut user);
    user
}

/// Create an active monthly plan mirrored to the billing provider.
pub fn create_test_plan(
    overrides: impl FnOnce(&mut SubscriptionPlanProfile),
) -> SubscriptionPlanProfile {
    let now = Utc::now();
    let mut plan = SubscriptionPlanProfile {
        id: Uuid::new_v4(),
        title: "Monthly".to_string(),
        description: Some("Everything, billed monthly".to_string()),
        price_cents: 1_000,
        currency: "usd".to_string(),
        duration: PlanDuration::Monthly,
        is_discounted: false,
        discount_percent: None,
        stripe_product_id: Some("prod_test".to_string()),
        stripe_price_id: Some("price_test".to_string()),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut plan);
    plan
}

/// Create a pending payment for an unrelated couple.
pub fn create_test_payment(overrides: impl FnOnce(&mut PaymentProfile)) -> PaymentProfile {
    let now = Utc::now();
    let mut payment = PaymentProfile {
        id: Uuid::new_v4(),
        couple_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        plan_id: Uuid::new_v4(),
        amount_cents: 1_000,
        currency: "usd".to_string(),
        status: PaymentStatus::Pending,
        stripe_payment_intent_id: None,
        stripe_subscription_id: None,
        stripe_customer_id: None,
        stripe_session_id: None,
        stripe_invoice_id: None,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut payment);
    payment
}

/// `stripe-signature` header value for `body`, computed the way the provider does.
pub fn sign_stripe_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
