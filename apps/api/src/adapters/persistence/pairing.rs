use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::pairing::{PairingAttempt, PairingRepo},
};

struct LockedMember {
    id: Uuid,
    invite_code: Option<String>,
    is_connected: bool,
    couple_id: Option<Uuid>,
}

impl LockedMember {
    fn is_paired(&self) -> bool {
        self.is_connected || self.couple_id.is_some()
    }
}

#[async_trait]
impl PairingRepo for PostgresPersistence {
    async fn pair_with_invite_code(
        &self,
        redeemer_id: Uuid,
        code: &str,
    ) -> AppResult<PairingAttempt> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        // Lock both rows in id order so concurrent redeemers cannot deadlock.
        let rows = sqlx::query(
            r#"
            SELECT id, invite_code, is_connected, couple_id
            FROM users
            WHERE id = $1 OR invite_code = $2
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(redeemer_id)
        .bind(code)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let members: Vec<LockedMember> = rows
            .into_iter()
            .map(|row| LockedMember {
                id: row.get("id"),
                invite_code: row.get("invite_code"),
                is_connected: row.get("is_connected"),
                couple_id: row.get("couple_id"),
            })
            .collect();

        let Some(redeemer) = members.iter().find(|m| m.id == redeemer_id) else {
            return Ok(PairingAttempt::RedeemerNotFound);
        };
        if redeemer.is_paired() {
            return Ok(PairingAttempt::RedeemerConnected);
        }
        let Some(owner) = members
            .iter()
            .find(|m| m.invite_code.as_deref() == Some(code))
        else {
            return Ok(PairingAttempt::CodeNotFound);
        };
        if owner.id == redeemer_id {
            return Ok(PairingAttempt::SelfPairing);
        }
        if owner.is_paired() {
            return Ok(PairingAttempt::CodeOwnerConnected);
        }

        let partner_id = owner.id;
        let couple_id = Uuid::new_v4();

        sqlx::query("INSERT INTO couples (id) VALUES ($1)")
            .bind(couple_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        sqlx::query(
            r#"
            UPDATE users
            SET couple_id = $1, is_connected = true, invite_code = NULL, updated_at = now()
            WHERE id = $2 OR id = $3
            "#,
        )
        .bind(couple_id)
        .bind(redeemer_id)
        .bind(partner_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;

        Ok(PairingAttempt::Paired {
            couple_id,
            partner_id,
        })
    }
}
