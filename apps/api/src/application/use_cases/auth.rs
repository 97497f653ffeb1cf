use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use secrecy::SecretString;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        email_templates, jwt,
        password::{constant_time_eq, hash_password, verify_password},
        ports::email::EmailSender,
        principal::Principal,
        use_cases::pairing::generate_unique_invite_code,
    },
    domain::entities::{user_role::UserRole, user_status::UserStatus},
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create(&self, input: &NewUser) -> AppResult<UserProfile>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn get_by_email(&self, email: &str) -> AppResult<Option<UserProfile>>;

    /// The other member of the couple, if any.
    async fn get_partner(&self, user_id: Uuid, couple_id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn invite_code_exists(&self, code: &str) -> AppResult<bool>;

    async fn set_otp(
        &self,
        id: Uuid,
        otp: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    /// Marks the email verified and clears the OTP.
    async fn mark_email_verified(&self, id: Uuid) -> AppResult<()>;

    /// Stores a new password hash and clears any pending OTP.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<()>;

    async fn update_full_name(&self, id: Uuid, full_name: &str) -> AppResult<UserProfile>;

    /// Sets the status on the user and, when paired, on the partner in the same transaction.
    /// Returns the number of rows updated.
    async fn set_status_for_couple(&self, id: Uuid, status: UserStatus) -> AppResult<u64>;

    /// Persists the billing customer handle unless one is already stored.
    /// Returns the handle that ends up stored.
    async fn save_stripe_customer_id(&self, id: Uuid, customer_id: &str) -> AppResult<String>;

    /// Clears the subscription window on every member of the couple in one transaction.
    async fn clear_window_for_couple(&self, couple_id: Uuid) -> AppResult<u64>;
}

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub is_email_verified: bool,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub invite_code: Option<String>,
    pub is_connected: bool,
    pub couple_id: Option<Uuid>,
    pub subscription_plan_id: Option<Uuid>,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id,
            role: self.role.into(),
            couple_id: self.couple_id,
        }
    }

    fn has_valid_otp(&self, otp: &str, now: DateTime<Utc>) -> bool {
        match (&self.otp, self.otp_expires_at) {
            (Some(stored), Some(expires_at)) => {
                expires_at >= now && constant_time_eq(stored, otp)
            }
            _ => false,
        }
    }

    fn has_unexpired_otp(&self, now: DateTime<Utc>) -> bool {
        self.otp.is_some() && self.otp_expires_at.is_some_and(|exp| exp > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub otp: String,
    pub otp_expires_at: DateTime<Utc>,
    pub invite_code: String,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated {
        access_token: String,
        user: UserProfile,
    },
    /// A fresh OTP was mailed; the client must verify before a token is issued.
    VerificationRequired { email: String },
}

#[derive(Debug, Clone)]
pub enum OtpVerification {
    EmailVerified {
        access_token: String,
        user: UserProfile,
    },
    /// The user was already verified; the code is valid for a password reset.
    ResetCodeValid,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct AuthUseCases {
    user_repo: Arc<dyn UserRepo>,
    email: Arc<dyn EmailSender>,
    jwt_secret: SecretString,
    access_token_ttl: time::Duration,
    otp_ttl_minutes: i64,
    app_origin: String,
}

impl AuthUseCases {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        email: Arc<dyn EmailSender>,
        jwt_secret: SecretString,
        access_token_ttl: time::Duration,
        otp_ttl_minutes: i64,
        app_origin: String,
    ) -> Self {
        Self {
            user_repo,
            email,
            jwt_secret,
            access_token_ttl,
            otp_ttl_minutes,
            app_origin,
        }
    }

    // ========================================================================
    // Registration & verification
    // ========================================================================

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> AppResult<UserProfile> {
        let email = normalize_email(email);
        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("User already exists".into()));
        }

        let otp = generate_otp();
        let invite_code = generate_unique_invite_code(self.user_repo.as_ref()).await?;
        let input = NewUser {
            email: email.clone(),
            full_name: full_name.trim().to_string(),
            password_hash: hash_password(password)?,
            role: UserRole::User,
            otp: otp.clone(),
            otp_expires_at: self.otp_expiry(),
            invite_code,
        };

        let user = self.user_repo.create(&input).await?;
        info!(user_id = %user.id, "User registered");

        self.send_verification_otp(&email, &otp).await?;
        Ok(user)
    }

    #[instrument(skip(self, otp))]
    pub async fn verify_otp(&self, email: &str, otp: &str) -> AppResult<OtpVerification> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::NotFound)?;

        if !user.has_valid_otp(otp, Utc::now()) {
            return Err(AppError::InvalidInput("Invalid or expired OTP".into()));
        }

        if user.is_email_verified {
            // Password reset flow: reset_password consumes the code.
            return Ok(OtpVerification::ResetCodeValid);
        }

        self.user_repo.mark_email_verified(user.id).await?;
        info!(user_id = %user.id, "Email verified");

        let access_token = self.issue_token(&user)?;
        let user = UserProfile {
            is_email_verified: true,
            otp: None,
            otp_expires_at: None,
            ..user
        };
        Ok(OtpVerification::EmailVerified { access_token, user })
    }

    #[instrument(skip(self))]
    pub async fn resend_otp(&self, email: &str) -> AppResult<()> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::NotFound)?;

        if user.status.is_suspended() {
            return Err(AppError::AccountSuspended);
        }
        if user.is_email_verified {
            return Err(AppError::InvalidInput("Email is already verified".into()));
        }

        let otp = generate_otp();
        self.user_repo
            .set_otp(user.id, Some(&otp), Some(self.otp_expiry()))
            .await?;
        self.send_verification_otp(&user.email, &otp).await
    }

    // ========================================================================
    // Login
    // ========================================================================

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }
        if user.status.is_suspended() {
            return Err(AppError::AccountSuspended);
        }

        if !user.is_email_verified && user.role != UserRole::Admin {
            let otp = generate_otp();
            self.user_repo
                .set_otp(user.id, Some(&otp), Some(self.otp_expiry()))
                .await?;
            self.send_verification_otp(&user.email, &otp).await?;
            return Ok(LoginOutcome::VerificationRequired { email: user.email });
        }

        let access_token = self.issue_token(&user)?;
        Ok(LoginOutcome::Authenticated { access_token, user })
    }

    // ========================================================================
    // Passwords
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::NotFound)?;

        if user.status.is_suspended() {
            return Err(AppError::AccountSuspended);
        }
        if user.has_unexpired_otp(Utc::now()) {
            return Err(AppError::Conflict(
                "An OTP was already sent. Please wait until it expires.".into(),
            ));
        }

        let otp = generate_otp();
        self.user_repo
            .set_otp(user.id, Some(&otp), Some(self.otp_expiry()))
            .await?;

        let (subject, html) =
            email_templates::password_reset_otp_email(&self.app_origin, &otp, self.otp_ttl_minutes);
        if let Err(e) = self.email.send(&user.email, &subject, &html).await {
            warn!(user_id = %user.id, error = %e, "Failed to send reset OTP, clearing it");
            self.user_repo.set_otp(user.id, None, None).await?;
            return Err(AppError::Internal("Failed to send OTP email".into()));
        }
        Ok(())
    }

    #[instrument(skip(self, otp, new_password))]
    pub async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> AppResult<()> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::NotFound)?;

        if !user.has_valid_otp(otp, Utc::now()) {
            return Err(AppError::InvalidInput("Invalid or expired OTP".into()));
        }

        let hash = hash_password(new_password)?;
        self.user_repo.update_password(user.id, &hash).await?;
        info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        principal: Principal,
        old_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self
            .user_repo
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(old_password, &user.password_hash)? {
            return Err(AppError::InvalidInput("Password incorrect".into()));
        }

        let hash = hash_password(new_password)?;
        self.user_repo.update_password(user.id, &hash).await
    }

    // ========================================================================
    // Profile & administration
    // ========================================================================

    pub async fn me(&self, principal: Principal) -> AppResult<(UserProfile, Option<UserProfile>)> {
        let user = self
            .user_repo
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let partner = match user.couple_id {
            Some(couple_id) => self.user_repo.get_partner(user.id, couple_id).await?,
            None => None,
        };
        Ok((user, partner))
    }

    pub async fn update_profile(
        &self,
        principal: Principal,
        full_name: &str,
    ) -> AppResult<UserProfile> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::InvalidInput("Full name is required".into()));
        }
        self.user_repo
            .update_full_name(principal.user_id, full_name)
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        principal: Principal,
        user_id: Uuid,
        status: UserStatus,
    ) -> AppResult<u64> {
        principal.require_admin()?;

        if self.user_repo.get_by_id(user_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let updated = self.user_repo.set_status_for_couple(user_id, status).await?;
        info!(%user_id, ?status, updated, "User status changed");
        Ok(updated)
    }

    /// Resolve the principal for a verified token subject.
    pub async fn resolve_principal(&self, user_id: Uuid) -> AppResult<Principal> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if user.status.is_suspended() {
            return Err(AppError::AccountSuspended);
        }
        Ok(user.principal())
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    fn issue_token(&self, user: &UserProfile) -> AppResult<String> {
        jwt::issue(
            user.id,
            user.role.into(),
            &self.jwt_secret,
            self.access_token_ttl,
        )
    }

    fn otp_expiry(&self) -> DateTime<Utc> {
        Utc::now() + Duration::minutes(self.otp_ttl_minutes)
    }

    async fn send_verification_otp(&self, email: &str, otp: &str) -> AppResult<()> {
        let (subject, html) =
            email_templates::verification_otp_email(&self.app_origin, otp, self.otp_ttl_minutes);
        self.email.send(email, &subject, &html).await
    }
}

/// Six-digit numeric one-time code.
fn generate_otp() -> String {
    rand::rngs::OsRng.gen_range(100_000..1_000_000).to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
