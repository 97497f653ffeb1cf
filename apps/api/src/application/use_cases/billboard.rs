use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{principal::Principal, use_cases::events::require_couple},
};

#[async_trait]
pub trait BillboardRepo: Send + Sync {
    async fn create(&self, input: &NewNote) -> AppResult<NoteProfile>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<NoteProfile>>;

    /// Newest first.
    async fn list_for_couple(&self, couple_id: Uuid) -> AppResult<Vec<NoteProfile>>;

    async fn update(
        &self,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<NoteProfile>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

/// A note pinned to the couple's shared board.
#[derive(Debug, Clone, Serialize)]
pub struct NoteProfile {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub created_by: Uuid,
    /// Author's display name, when the author still exists.
    pub created_by_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct BillboardUseCases {
    billboard_repo: Arc<dyn BillboardRepo>,
}

impl BillboardUseCases {
    pub fn new(billboard_repo: Arc<dyn BillboardRepo>) -> Self {
        Self { billboard_repo }
    }

    pub async fn create(
        &self,
        principal: Principal,
        title: &str,
        description: Option<String>,
    ) -> AppResult<NoteProfile> {
        let couple_id = require_couple(principal)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("Title is required".into()));
        }

        let note = self
            .billboard_repo
            .create(&NewNote {
                id: Uuid::new_v4(),
                couple_id,
                created_by: principal.user_id,
                title: title.to_string(),
                description,
            })
            .await?;
        info!(note_id = %note.id, %couple_id, "Billboard note created");
        Ok(note)
    }

    pub async fn list(&self, principal: Principal) -> AppResult<Vec<NoteProfile>> {
        let couple_id = require_couple(principal)?;
        self.billboard_repo.list_for_couple(couple_id).await
    }

    pub async fn get(&self, principal: Principal, id: Uuid) -> AppResult<NoteProfile> {
        let note = self
            .billboard_repo
            .get_by_id(id)
            .await?
            .ok_or(AppError::NotFound)?;
        if principal.couple_id != Some(note.couple_id) {
            return Err(AppError::Forbidden);
        }
        Ok(note)
    }

    /// Either partner may edit any note of their board.
    pub async fn update(
        &self,
        principal: Principal,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<NoteProfile> {
        self.get(principal, id).await?;
        let title = title.map(str::trim);
        if title.is_some_and(str::is_empty) {
            return Err(AppError::InvalidInput("Title is required".into()));
        }
        self.billboard_repo.update(id, title, description).await
    }

    pub async fn delete(&self, principal: Principal, id: Uuid) -> AppResult<()> {
        self.get(principal, id).await?;
        self.billboard_repo.delete(id).await?;
        info!(note_id = %id, "Billboard note deleted");
        Ok(())
    }
}
