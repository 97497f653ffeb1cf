use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billboard::{BillboardRepo, NewNote, NoteProfile},
};

/// Expects the `b` alias for billboards and `u` for the author.
const SELECT_COLS: &str = r#"
    b.id, b.couple_id, b.created_by, u.full_name AS created_by_name,
    b.title, b.description, b.created_at, b.updated_at
"#;

fn row_to_profile(row: sqlx::postgres::PgRow) -> NoteProfile {
    NoteProfile {
        id: row.get("id"),
        couple_id: row.get("couple_id"),
        created_by: row.get("created_by"),
        created_by_name: row.get("created_by_name"),
        title: row.get("title"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl PostgresPersistence {
    async fn fetch_note(&self, id: Uuid) -> AppResult<Option<NoteProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM billboards b
            LEFT JOIN users u ON u.id = b.created_by
            WHERE b.id = $1
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }
}

#[async_trait]
impl BillboardRepo for PostgresPersistence {
    async fn create(&self, input: &NewNote) -> AppResult<NoteProfile> {
        sqlx::query(
            r#"
            INSERT INTO billboards (id, couple_id, created_by, title, description)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(input.id)
        .bind(input.couple_id)
        .bind(input.created_by)
        .bind(&input.title)
        .bind(&input.description)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        self.fetch_note(input.id).await?.ok_or(AppError::NotFound)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<NoteProfile>> {
        self.fetch_note(id).await
    }

    async fn list_for_couple(&self, couple_id: Uuid) -> AppResult<Vec<NoteProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM billboards b
            LEFT JOIN users u ON u.id = b.created_by
            WHERE b.couple_id = $1
            ORDER BY b.created_at DESC
            "#,
            SELECT_COLS
        ))
        .bind(couple_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_profile).collect())
    }

    async fn update(
        &self,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<NoteProfile> {
        let result = sqlx::query(
            r#"
            UPDATE billboards
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        self.fetch_note(id).await?.ok_or(AppError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM billboards WHERE id = $1")
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
