use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::Postgres;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::events::{EventChanges, EventProfile, EventRepo, NewEvent},
    domain::entities::event_status::EventStatus,
};

const SELECT_COLS: &str = r#"
    id, couple_id, created_by, approved_by, title, description, event_date,
    event_time, location, lat, lon, status, is_deleted, created_at, updated_at
"#;

fn row_to_profile(row: sqlx::postgres::PgRow) -> EventProfile {
    EventProfile {
        id: row.get("id"),
        couple_id: row.get("couple_id"),
        created_by: row.get("created_by"),
        approved_by: row.get("approved_by"),
        title: row.get("title"),
        description: row.get("description"),
        date: row.get("event_date"),
        time: row.get("event_time"),
        location: row.get("location"),
        lat: row.get("lat"),
        lon: row.get("lon"),
        status: row.get("status"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl EventRepo for PostgresPersistence {
    async fn create(&self, input: &NewEvent) -> AppResult<EventProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO events (
                id, couple_id, created_by, title, description, event_date,
                event_time, location, lat, lon
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(input.id)
        .bind(input.couple_id)
        .bind(input.created_by)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.date)
        .bind(&input.time)
        .bind(&input.location)
        .bind(input.lat)
        .bind(input.lon)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<EventProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn list_for_couple(&self, couple_id: Uuid) -> AppResult<Vec<EventProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM events
            WHERE couple_id = $1 AND NOT is_deleted
            ORDER BY event_date ASC, created_at ASC
            "#,
            SELECT_COLS
        ))
        .bind(couple_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_profile).collect())
    }

    async fn mark_past(&self, couple_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE events SET status = $3, updated_at = now()
            WHERE couple_id = $1 AND event_date < $2 AND status NOT IN ($3, $4)
            "#,
        )
        .bind(couple_id)
        .bind(now)
        .bind(EventStatus::Past)
        .bind(EventStatus::Cancelled)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }

    async fn update(&self, id: Uuid, changes: &EventChanges) -> AppResult<EventProfile> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE events SET updated_at = now()");
        if let Some(title) = &changes.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(description) = &changes.description {
            builder.push(", description = ").push_bind(description);
        }
        if let Some(date) = changes.date {
            builder.push(", event_date = ").push_bind(date);
        }
        if let Some(time) = &changes.time {
            builder.push(", event_time = ").push_bind(time);
        }
        if let Some(location) = &changes.location {
            builder.push(", location = ").push_bind(location);
        }
        if let Some(lat) = changes.lat {
            builder.push(", lat = ").push_bind(lat);
        }
        if let Some(lon) = changes.lon {
            builder.push(", lon = ").push_bind(lon);
        }
        if let Some(status) = changes.status {
            builder.push(", status = ").push_bind(status);
        }
        if let Some(approved_by) = changes.approved_by {
            builder.push(", approved_by = ").push_bind(approved_by);
        }
        builder.push(" WHERE id = ").push_bind(id);
        builder.push(format!(" RETURNING {}", SELECT_COLS));

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::NotFound)?;

        Ok(row_to_profile(row))
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<EventProfile> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE events SET is_deleted = true, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;

        Ok(row_to_profile(row))
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
