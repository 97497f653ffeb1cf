use async_trait::async_trait;
use sqlx::postgres::Postgres;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::payment::{
        NewPayment, PaymentListItem, PaymentListQuery, PaymentPage, PaymentProfile, PaymentRepo,
        PaymentScope,
    },
    domain::entities::payment_status::PaymentStatus,
};

const SELECT_COLS: &str = r#"
    p.id, p.couple_id, p.user_id, p.plan_id, p.amount_cents, p.currency, p.status,
    p.stripe_payment_intent_id, p.stripe_subscription_id, p.stripe_customer_id,
    p.stripe_session_id, p.stripe_invoice_id, p.created_at, p.updated_at
"#;

pub(crate) fn row_to_profile(row: &sqlx::postgres::PgRow) -> PaymentProfile {
    PaymentProfile {
        id: row.get("id"),
        couple_id: row.get("couple_id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        stripe_payment_intent_id: row.get("stripe_payment_intent_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        stripe_customer_id: row.get("stripe_customer_id"),
        stripe_session_id: row.get("stripe_session_id"),
        stripe_invoice_id: row.get("stripe_invoice_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_list_item(row: sqlx::postgres::PgRow) -> PaymentListItem {
    PaymentListItem {
        payment: row_to_profile(&row),
        plan_title: row.get("plan_title"),
        customer_name: row
            .get::<Option<String>, _>("customer_name")
            .unwrap_or_default(),
    }
}

/// Expects the `p` alias for payments.
fn push_list_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PaymentListQuery) {
    builder.push(" WHERE TRUE");
    match query.scope {
        PaymentScope::All => {}
        PaymentScope::Couple(couple_id) => {
            builder.push(" AND p.couple_id = ").push_bind(couple_id);
        }
        PaymentScope::User(user_id) => {
            builder.push(" AND p.user_id = ").push_bind(user_id);
        }
    }
    if let Some(status) = query.status {
        builder.push(" AND p.status = ").push_bind(status);
    }
}

fn insert_sql(conflict_clause: &str) -> String {
    format!(
        r#"
        INSERT INTO payments AS p (
            id, couple_id, user_id, plan_id, amount_cents, currency, status,
            stripe_payment_intent_id, stripe_subscription_id, stripe_customer_id,
            stripe_session_id, stripe_invoice_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        {}
        RETURNING {}
        "#,
        conflict_clause, SELECT_COLS
    )
}

fn bind_new_payment<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    input: &'q NewPayment,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(input.id)
        .bind(input.couple_id)
        .bind(input.user_id)
        .bind(input.plan_id)
        .bind(input.amount_cents)
        .bind(&input.currency)
        .bind(input.status)
        .bind(&input.stripe_payment_intent_id)
        .bind(&input.stripe_subscription_id)
        .bind(&input.stripe_customer_id)
        .bind(&input.stripe_session_id)
        .bind(&input.stripe_invoice_id)
}

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn upsert_purchase(&self, input: &NewPayment) -> AppResult<PaymentProfile> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sql = insert_sql(
            "ON CONFLICT (stripe_subscription_id) WHERE stripe_invoice_id IS NULL \
             DO UPDATE SET updated_at = p.updated_at",
        );
        let row = bind_new_payment(sqlx::query(&sql), input)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::Conflict("A purchase is already in progress".into())
                }
                other => other,
            })?;

        Ok(row_to_profile(&row))
    }

    async fn create(&self, input: &NewPayment) -> AppResult<PaymentProfile> {
        let sql = insert_sql("");
        let row = bind_new_payment(sqlx::query(&sql), input)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict("Payment already exists".into()),
                other => other,
            })?;

        Ok(row_to_profile(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments p WHERE p.id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn get_by_session(&self, session_id: &str) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments p WHERE p.stripe_session_id = $1",
            SELECT_COLS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments p WHERE p.stripe_payment_intent_id = $1",
            SELECT_COLS
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn find_by_invoice(&self, invoice_id: &str) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments p WHERE p.stripe_invoice_id = $1",
            SELECT_COLS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn latest_by_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payments p
            WHERE p.stripe_subscription_id = $1
            ORDER BY p.created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn latest_success_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payments p
            WHERE p.couple_id = $1 AND p.status = $2
            ORDER BY p.created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(couple_id)
        .bind(PaymentStatus::Success)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn pending_attempt_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payments p
            WHERE p.couple_id = $1 AND p.status = $2 AND p.stripe_invoice_id IS NULL
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(couple_id)
        .bind(PaymentStatus::Pending)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn latest_settled_attempt_for_couple(
        &self,
        couple_id: Uuid,
    ) -> AppResult<Option<PaymentProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM payments p
            WHERE p.couple_id = $1 AND p.status <> $2 AND p.stripe_invoice_id IS NULL
            ORDER BY p.created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(couple_id)
        .bind(PaymentStatus::Pending)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn list(&self, query: &PaymentListQuery) -> AppResult<PaymentPage> {
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM payments p");
        push_list_filters(&mut count_builder, query);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;

        let mut data_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            SELECT {},
                sp.title AS plan_title,
                (SELECT string_agg(u.full_name, ' & ' ORDER BY u.created_at)
                 FROM users u WHERE u.couple_id = p.couple_id) AS customer_name
            FROM payments p
            LEFT JOIN subscription_plans sp ON sp.id = p.plan_id
            "#,
            SELECT_COLS
        ));
        push_list_filters(&mut data_builder, query);
        data_builder.push(" ORDER BY p.created_at DESC");
        data_builder.push(" LIMIT ").push_bind(query.limit);
        data_builder.push(" OFFSET ").push_bind(query.offset());

        let rows = data_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(PaymentPage {
            payments: rows.into_iter().map(row_to_list_item).collect(),
            total,
        })
    }

    async fn total_revenue_cents(&self) -> AppResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments WHERE status = $1",
        )
        .bind(PaymentStatus::Success)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(total)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() > 0)
    }
}
