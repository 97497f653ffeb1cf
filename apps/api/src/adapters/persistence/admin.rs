use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::Postgres;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence,
        user::{SELECT_COLS as USER_COLS, row_to_profile},
    },
    app_error::{AppError, AppResult},
    application::use_cases::{
        admin::{CoupleDirectoryRepo, CoupleMembers, CouplePage, CoupleQuery, CoupleStatus},
        auth::UserProfile,
    },
    domain::entities::{user_role::UserRole, user_status::UserStatus},
};

/// Couples of exactly two non-admin members, with their combined standing.
fn push_pairs(builder: &mut QueryBuilder<'_, Postgres>) {
    builder.push(
        r#"
        WITH pairs AS (
            SELECT c.id, c.created_at,
                bool_and(u.status = "#,
    );
    builder.push_bind(UserStatus::Active);
    builder.push(") AS all_active, bool_and(u.status = ");
    builder.push_bind(UserStatus::Suspended);
    builder.push(
        r#") AS all_suspended
            FROM couples c
            JOIN users u ON u.couple_id = c.id
            GROUP BY c.id, c.created_at
            HAVING COUNT(*) = 2 AND bool_and(u.role <> "#,
    );
    builder.push_bind(UserRole::Admin);
    builder.push("))");
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CoupleQuery) {
    builder.push(" WHERE TRUE");
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND EXISTS (SELECT 1 FROM users m WHERE m.couple_id = pairs.id AND (m.full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR m.email ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
    match query.status {
        None => {}
        Some(CoupleStatus::Active) => {
            builder.push(" AND all_active");
        }
        Some(CoupleStatus::Suspended) => {
            builder.push(" AND all_suspended");
        }
        Some(CoupleStatus::Mixed) => {
            builder.push(" AND NOT all_active AND NOT all_suspended");
        }
    }
}

#[async_trait]
impl CoupleDirectoryRepo for PostgresPersistence {
    async fn list_couples(&self, query: &CoupleQuery) -> AppResult<CouplePage> {
        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("");
        push_pairs(&mut count_builder);
        count_builder.push(" SELECT COUNT(*) FROM pairs");
        push_filters(&mut count_builder, query);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;

        let mut data_builder: QueryBuilder<Postgres> = QueryBuilder::new("");
        push_pairs(&mut data_builder);
        data_builder.push(" SELECT pairs.id, pairs.created_at FROM pairs");
        push_filters(&mut data_builder, query);
        data_builder.push(" ORDER BY pairs.created_at DESC, pairs.id");
        data_builder.push(" LIMIT ").push_bind(query.limit);
        data_builder.push(" OFFSET ").push_bind(query.offset());

        let pairs: Vec<(Uuid, DateTime<Utc>)> = data_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(|row| (row.get("id"), row.get("created_at")))
            .collect();

        let ids: Vec<Uuid> = pairs.iter().map(|(id, _)| *id).collect();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE couple_id = ANY($1) ORDER BY full_name, id",
            USER_COLS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        let mut members: HashMap<Uuid, Vec<UserProfile>> = HashMap::new();
        for user in rows.into_iter().map(row_to_profile) {
            if let Some(couple_id) = user.couple_id {
                members.entry(couple_id).or_default().push(user);
            }
        }

        Ok(CouplePage {
            couples: pairs
                .into_iter()
                .map(|(couple_id, created_at)| CoupleMembers {
                    couple_id,
                    created_at,
                    members: members.remove(&couple_id).unwrap_or_default(),
                })
                .collect(),
            total,
        })
    }

    async fn hard_delete_couple(&self, couple_id: Uuid) -> AppResult<Option<Vec<UserProfile>>> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let members: Vec<UserProfile> = sqlx::query(&format!(
            "SELECT {} FROM users WHERE couple_id = $1 ORDER BY full_name, id FOR UPDATE",
            USER_COLS
        ))
        .bind(couple_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(row_to_profile)
        .collect();

        if members.len() != 2 || members.iter().any(|m| m.role == UserRole::Admin) {
            return Ok(None);
        }

        // Payments, events and notes go with the users and the couple row.
        sqlx::query("DELETE FROM users WHERE couple_id = $1")
            .bind(couple_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;
        sqlx::query("DELETE FROM couples WHERE id = $1")
            .bind(couple_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(Some(members))
    }
}
