use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{principal::Principal, use_cases::auth::UserRepo},
};

const INVITE_CODE_BYTES: usize = 3;
const MAX_CODE_ATTEMPTS: usize = 5;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait PairingRepo: Send + Sync {
    /// Redeem `code` for `redeemer_id` in one transaction.
    ///
    /// Both user rows are locked before any check runs, so two redeemers racing
    /// on one code serialize and the loser sees the code already consumed.
    /// Creates the couple, links both users and clears both invite codes,
    /// or writes nothing.
    async fn pair_with_invite_code(&self, redeemer_id: Uuid, code: &str)
    -> AppResult<PairingAttempt>;
}

/// Outcome of a redemption, evaluated under lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingAttempt {
    Paired { couple_id: Uuid, partner_id: Uuid },
    RedeemerNotFound,
    RedeemerConnected,
    CodeNotFound,
    CodeOwnerConnected,
    SelfPairing,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PairingUseCases {
    user_repo: Arc<dyn UserRepo>,
    pairing_repo: Arc<dyn PairingRepo>,
    tx_timeout: Duration,
}

impl PairingUseCases {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        pairing_repo: Arc<dyn PairingRepo>,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            user_repo,
            pairing_repo,
            tx_timeout,
        }
    }

    /// The caller's unredeemed invite code.
    #[instrument(skip(self))]
    pub async fn issue_invite_code(&self, principal: Principal) -> AppResult<String> {
        let user = self
            .user_repo
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if user.is_connected || user.couple_id.is_some() {
            return Err(AppError::Conflict("You are already connected".into()));
        }

        user.invite_code
            .ok_or_else(|| AppError::InvalidInput("No invite code available".into()))
    }

    #[instrument(skip(self))]
    pub async fn redeem_invite_code(&self, principal: Principal, code: &str) -> AppResult<Uuid> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::InvalidInput("Invite code is required".into()));
        }

        let attempt = tokio::time::timeout(
            self.tx_timeout,
            self.pairing_repo
                .pair_with_invite_code(principal.user_id, &code),
        )
        .await
        .map_err(|_| {
            warn!(user_id = %principal.user_id, "Pairing transaction timed out");
            AppError::Internal("Pairing timed out".into())
        })??;

        match attempt {
            PairingAttempt::Paired {
                couple_id,
                partner_id,
            } => {
                info!(user_id = %principal.user_id, %partner_id, %couple_id, "Users paired");
                Ok(couple_id)
            }
            PairingAttempt::RedeemerNotFound => Err(AppError::NotFound),
            PairingAttempt::RedeemerConnected => {
                Err(AppError::InvalidInput("You are already connected".into()))
            }
            PairingAttempt::CodeNotFound | PairingAttempt::CodeOwnerConnected => Err(
                AppError::InvalidInput("Invalid or already used invite code".into()),
            ),
            PairingAttempt::SelfPairing => Err(AppError::InvalidInput(
                "You cannot connect with your own invite code".into(),
            )),
        }
    }
}

// ============================================================================
// Code Generation
// ============================================================================

/// Six upper-case hex characters from three random bytes.
pub fn generate_invite_code() -> String {
    let mut bytes = [0u8; INVITE_CODE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Generate a code not currently held by any user.
pub async fn generate_unique_invite_code(user_repo: &dyn UserRepo) -> AppResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_invite_code();
        if !user_repo.invite_code_exists(&code).await? {
            return Ok(code);
        }
    }
    Err(AppError::Internal(
        "Could not generate a unique invite code".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryPersistence, create_test_user};

    fn use_cases(store: Arc<InMemoryPersistence>) -> PairingUseCases {
        PairingUseCases::new(store.clone(), store, Duration::from_secs(5))
    }

    #[test]
    fn test_generate_invite_code_format() {
        for _ in 0..100 {
            let code = generate_invite_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(code, code.to_uppercase());
        }
    }

    #[tokio::test]
    async fn test_issue_invite_code() {
        let user = create_test_user(|u| u.invite_code = Some("AB12CD".to_string()));
        let connected = create_test_user(|u| {
            u.is_connected = true;
            u.couple_id = Some(Uuid::new_v4());
            u.invite_code = None;
        });
        let used = create_test_user(|u| u.invite_code = None);
        let (p1, p2, p3) = (user.principal(), connected.principal(), used.principal());
        let pairing = use_cases(Arc::new(InMemoryPersistence::with_users(vec![
            user, connected, used,
        ])));

        assert_eq!(pairing.issue_invite_code(p1).await.unwrap(), "AB12CD");
        assert!(matches!(
            pairing.issue_invite_code(p2).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            pairing.issue_invite_code(p3).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_redeem_links_both_users_and_clears_codes() {
        let a = create_test_user(|u| u.invite_code = Some("AB12CD".to_string()));
        let b = create_test_user(|u| u.invite_code = Some("FFEE01".to_string()));
        let (a_id, b_id) = (a.id, b.id);
        let b_principal = b.principal();
        let store = Arc::new(InMemoryPersistence::with_users(vec![a, b]));
        let pairing = use_cases(store.clone());

        // Codes are matched case-insensitively.
        let couple_id = pairing
            .redeem_invite_code(b_principal, " ab12cd ")
            .await
            .unwrap();

        for id in [a_id, b_id] {
            let user = store.user(id).unwrap();
            assert_eq!(user.couple_id, Some(couple_id));
            assert!(user.is_connected);
            assert!(user.invite_code.is_none());
        }
        assert_eq!(store.couple_count(), 1);
    }

    #[tokio::test]
    async fn test_redeem_rejects_invalid_codes() {
        let a = create_test_user(|u| u.invite_code = Some("AB12CD".to_string()));
        let taken = create_test_user(|u| {
            u.invite_code = Some("C0FFEE".to_string());
            u.is_connected = true;
            u.couple_id = Some(Uuid::new_v4());
        });
        let a_principal = a.principal();
        let store = Arc::new(InMemoryPersistence::with_users(vec![a, taken]));
        let pairing = use_cases(store.clone());

        let unknown = pairing.redeem_invite_code(a_principal, "000000").await;
        assert!(matches!(unknown, Err(AppError::InvalidInput(_))));

        let own = pairing.redeem_invite_code(a_principal, "AB12CD").await;
        assert!(matches!(own, Err(AppError::InvalidInput(_))));

        let owner_connected = pairing.redeem_invite_code(a_principal, "C0FFEE").await;
        assert!(matches!(owner_connected, Err(AppError::InvalidInput(_))));

        assert_eq!(store.couple_count(), 0);
    }

    #[tokio::test]
    async fn test_redeem_when_already_connected() {
        let a = create_test_user(|u| u.invite_code = Some("AB12CD".to_string()));
        let b = create_test_user(|u| {
            u.is_connected = true;
            u.couple_id = Some(Uuid::new_v4());
        });
        let b_principal = b.principal();
        let pairing = use_cases(Arc::new(InMemoryPersistence::with_users(vec![a, b])));

        let result = pairing.redeem_invite_code(b_principal, "AB12CD").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_redeem_missing_redeemer() {
        let a = create_test_user(|u| u.invite_code = Some("AB12CD".to_string()));
        let ghost = create_test_user(|_| {}).principal();
        let pairing = use_cases(Arc::new(InMemoryPersistence::with_users(vec![a])));

        let result = pairing.redeem_invite_code(ghost, "AB12CD").await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_concurrent_redemption_has_one_winner() {
        let owner = create_test_user(|u| u.invite_code = Some("AB12CD".to_string()));
        let first = create_test_user(|_| {});
        let second = create_test_user(|_| {});
        let owner_id = owner.id;
        let (p1, p2) = (first.principal(), second.principal());
        let store = Arc::new(InMemoryPersistence::with_users(vec![owner, first, second]));
        let pairing = use_cases(store.clone());

        let (r1, r2) = tokio::join!(
            pairing.redeem_invite_code(p1, "AB12CD"),
            pairing.redeem_invite_code(p2, "AB12CD"),
        );

        let wins = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = if r1.is_ok() { r2 } else { r1 };
        assert!(matches!(loser, Err(AppError::InvalidInput(_))));
        assert_eq!(store.couple_count(), 1);

        let owner = store.user(owner_id).unwrap();
        let members = store.couple_members(owner.couple_id.unwrap());
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_unique_invite_code_skips_taken_codes() {
        let store = InMemoryPersistence::new();
        let code = generate_unique_invite_code(&store).await.unwrap();
        assert!(!store.invite_code_exists(&code).await.unwrap());
    }
}
