use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::catalog::{NewPlan, PlanRepo, SubscriptionPlanProfile},
};

const SELECT_COLS: &str = r#"
    id, title, description, price_cents, currency, duration,
    is_discounted, discount_percent, stripe_product_id, stripe_price_id,
    is_active, created_at, updated_at
"#;

fn row_to_profile(row: sqlx::postgres::PgRow) -> SubscriptionPlanProfile {
    SubscriptionPlanProfile {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        price_cents: row.get("price_cents"),
        currency: row.get("currency"),
        duration: row.get("duration"),
        is_discounted: row.get("is_discounted"),
        discount_percent: row.get("discount_percent"),
        stripe_product_id: row.get("stripe_product_id"),
        stripe_price_id: row.get("stripe_price_id"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PlanRepo for PostgresPersistence {
    async fn create(&self, input: &NewPlan) -> AppResult<SubscriptionPlanProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscription_plans (
                id, title, description, price_cents, currency, duration,
                is_discounted, discount_percent, stripe_product_id, stripe_price_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.price_cents)
        .bind(&input.currency)
        .bind(input.duration)
        .bind(input.is_discounted)
        .bind(input.discount_percent)
        .bind(&input.stripe_product_id)
        .bind(&input.stripe_price_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlanProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn list(&self, include_inactive: bool) -> AppResult<Vec<SubscriptionPlanProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscription_plans
            WHERE $1 OR is_active
            ORDER BY price_cents ASC, created_at ASC
            "#,
            SELECT_COLS
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_profile).collect())
    }

    async fn update(&self, id: Uuid, input: &NewPlan) -> AppResult<SubscriptionPlanProfile> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscription_plans SET
                title = $2, description = $3, price_cents = $4, currency = $5,
                duration = $6, is_discounted = $7, discount_percent = $8,
                stripe_product_id = $9, stripe_price_id = $10, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.price_cents)
        .bind(&input.currency)
        .bind(input.duration)
        .bind(input.is_discounted)
        .bind(input.discount_percent)
        .bind(&input.stripe_product_id)
        .bind(&input.stripe_price_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;

        Ok(row_to_profile(row))
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE subscription_plans SET is_active = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
