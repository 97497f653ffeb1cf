use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::auth::{NewUser, UserProfile, UserRepo},
    domain::entities::user_status::UserStatus,
};

pub(crate) const SELECT_COLS: &str = r#"
    id, email, full_name, password_hash, role, status, is_email_verified,
    otp, otp_expires_at, invite_code, is_connected, couple_id,
    subscription_plan_id, subscription_start, subscription_end,
    stripe_customer_id, created_at
"#;

pub(crate) fn row_to_profile(row: sqlx::postgres::PgRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        status: row.get("status"),
        is_email_verified: row.get("is_email_verified"),
        otp: row.get("otp"),
        otp_expires_at: row.get("otp_expires_at"),
        invite_code: row.get("invite_code"),
        is_connected: row.get("is_connected"),
        couple_id: row.get("couple_id"),
        subscription_plan_id: row.get("subscription_plan_id"),
        subscription_start: row.get("subscription_start"),
        subscription_end: row.get("subscription_end"),
        stripe_customer_id: row.get("stripe_customer_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepo for PostgresPersistence {
    async fn create(&self, input: &NewUser) -> AppResult<UserProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, role, otp, otp_expires_at, invite_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.email)
        .bind(&input.full_name)
        .bind(&input.password_hash)
        .bind(input.role)
        .bind(&input.otp)
        .bind(input.otp_expires_at)
        .bind(&input.invite_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("User already exists".into()),
            other => other,
        })?;

        Ok(row_to_profile(row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = $1",
            SELECT_COLS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn get_partner(&self, user_id: Uuid, couple_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE couple_id = $1 AND id <> $2 LIMIT 1",
            SELECT_COLS
        ))
        .bind(couple_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn invite_code_exists(&self, code: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE invite_code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::from)?;
        Ok(exists)
    }

    async fn set_otp(
        &self,
        id: Uuid,
        otp: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET otp = $2, otp_expires_at = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(otp)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_email_verified = true, otp = NULL, otp_expires_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, otp = NULL, otp_expires_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn update_full_name(&self, id: Uuid, full_name: &str) -> AppResult<UserProfile> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET full_name = $2, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;

        Ok(row_to_profile(row))
    }

    async fn set_status_for_couple(&self, id: Uuid, status: UserStatus) -> AppResult<u64> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let couple_id: Option<Uuid> =
            sqlx::query_scalar("SELECT couple_id FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(AppError::from)?
                .ok_or(AppError::NotFound)?;

        let result = sqlx::query(
            r#"
            UPDATE users SET status = $3, updated_at = now()
            WHERE id = $1 OR ($2::uuid IS NOT NULL AND couple_id = $2)
            "#,
        )
        .bind(id)
        .bind(couple_id)
        .bind(status)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(result.rows_affected())
    }

    async fn save_stripe_customer_id(&self, id: Uuid, customer_id: &str) -> AppResult<String> {
        let stored: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET stripe_customer_id = COALESCE(stripe_customer_id, $2), updated_at = now()
            WHERE id = $1
            RETURNING stripe_customer_id
            "#,
        )
        .bind(id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;

        stored.ok_or_else(|| AppError::Internal("Customer id was not stored".into()))
    }

    async fn clear_window_for_couple(&self, couple_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_plan_id = NULL, subscription_start = NULL,
                subscription_end = NULL, updated_at = now()
            WHERE couple_id = $1
            "#,
        )
        .bind(couple_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}
