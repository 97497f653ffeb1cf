use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciler::{BillingLedgerRepo, LedgerWrite, WindowWrite},
};

#[async_trait]
impl BillingLedgerRepo for PostgresPersistence {
    async fn is_event_processed(&self, event_id: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM billing_webhook_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(exists)
    }

    async fn record_event(&self, event_id: &str, event_type: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn apply(&self, write: &LedgerWrite) -> AppResult<bool> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        // Claiming the event id first serializes concurrent deliveries of one event.
        let claimed = sqlx::query(
            r#"
            INSERT INTO billing_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&write.event_id)
        .bind(&write.event_type)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;
        if claimed.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(t) = &write.payment {
            let updated = sqlx::query(
                r#"
                UPDATE payments SET
                    status = $3,
                    stripe_subscription_id = COALESCE(stripe_subscription_id, $4),
                    stripe_customer_id = COALESCE(stripe_customer_id, $5),
                    stripe_payment_intent_id = COALESCE(stripe_payment_intent_id, $6),
                    updated_at = now()
                WHERE id = $1 AND status = $2
                "#,
            )
            .bind(t.payment_id)
            .bind(t.from)
            .bind(t.to)
            .bind(&t.stripe_subscription_id)
            .bind(&t.stripe_customer_id)
            .bind(&t.stripe_payment_intent_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;
            if updated.rows_affected() == 0 {
                return Ok(false);
            }
        }

        if let Some(renewal) = &write.renewal {
            let inserted = sqlx::query(
                r#"
                INSERT INTO payments (
                    id, couple_id, user_id, plan_id, amount_cents, currency, status,
                    stripe_payment_intent_id, stripe_subscription_id, stripe_customer_id,
                    stripe_session_id, stripe_invoice_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (stripe_invoice_id) DO NOTHING
                "#,
            )
            .bind(renewal.id)
            .bind(renewal.couple_id)
            .bind(renewal.user_id)
            .bind(renewal.plan_id)
            .bind(renewal.amount_cents)
            .bind(&renewal.currency)
            .bind(renewal.status)
            .bind(&renewal.stripe_payment_intent_id)
            .bind(&renewal.stripe_subscription_id)
            .bind(&renewal.stripe_customer_id)
            .bind(&renewal.stripe_session_id)
            .bind(&renewal.stripe_invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;
            if inserted.rows_affected() == 0 {
                return Ok(false);
            }
        }

        apply_window(&mut tx, write.couple_id, &write.window).await?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(true)
    }
}

async fn apply_window(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    couple_id: Uuid,
    window: &WindowWrite,
) -> AppResult<()> {
    let query = match window {
        WindowWrite::Keep => return Ok(()),
        WindowWrite::Set {
            plan_id,
            start,
            end,
        } => sqlx::query(
            r#"
            UPDATE users SET
                subscription_plan_id = $2, subscription_start = $3, subscription_end = $4,
                updated_at = now()
            WHERE couple_id = $1
            "#,
        )
        .bind(couple_id)
        .bind(*plan_id)
        .bind(*start)
        .bind(*end),
        WindowWrite::Extend { plan_id, end } => sqlx::query(
            r#"
            UPDATE users SET
                subscription_plan_id = $2,
                subscription_start = COALESCE(subscription_start, now()),
                subscription_end = GREATEST(COALESCE(subscription_end, $3), $3),
                updated_at = now()
            WHERE couple_id = $1
            "#,
        )
        .bind(couple_id)
        .bind(*plan_id)
        .bind(*end),
        WindowWrite::SyncEnd { end } => sqlx::query(
            r#"
            UPDATE users SET subscription_end = $2, updated_at = now()
            WHERE couple_id = $1 AND subscription_end IS NOT NULL
            "#,
        )
        .bind(couple_id)
        .bind(*end),
        WindowWrite::Clear => sqlx::query(
            r#"
            UPDATE users SET
                subscription_plan_id = NULL, subscription_start = NULL, subscription_end = NULL,
                updated_at = now()
            WHERE couple_id = $1
            "#,
        )
        .bind(couple_id),
    };

    query.execute(&mut **tx).await.map_err(AppError::from)?;
    Ok(())
}
