use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    claims::{Claims, TokenKind},
    jwt::JwtKeys,
};
use crate::{error::AppError, users::repo::CredentialStore};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints, verifies and rotates access/refresh tokens.
///
/// A user's refresh-token slot in the credential store holds the only
/// refresh token that is accepted; overwriting the slot revokes the old one.
#[derive(Clone)]
pub struct TokenService {
    keys: JwtKeys,
    store: Arc<dyn CredentialStore>,
}

impl TokenService {
    pub fn new(keys: JwtKeys, store: Arc<dyn CredentialStore>) -> Self {
        Self { keys, store }
    }

    pub fn access_ttl(&self) -> Duration {
        self.keys.ttl(TokenKind::Access)
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.keys.ttl(TokenKind::Refresh)
    }

    fn mint_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.keys.sign_access(user_id).map_err(AppError::TokenIssuance)?,
            refresh_token: self.keys.sign_refresh(user_id).map_err(AppError::TokenIssuance)?,
        })
    }

    /// Mints a fresh pair for `user_id` and stores the refresh token in the
    /// user's slot, replacing whatever was there.
    #[instrument(skip(self))]
    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(AppError::TokenIssuance)?
            .ok_or_else(|| AppError::TokenIssuance(anyhow!("user {} not found", user_id)))?;

        let pair = self.mint_pair(user.id)?;
        let saved = self
            .store
            .save_refresh_token(user.id, Some(&pair.refresh_token))
            .await
            .map_err(AppError::TokenIssuance)?;
        if !saved {
            return Err(AppError::TokenIssuance(anyhow!(
                "refresh token for {} was not persisted",
                user.id
            )));
        }
        Ok(pair)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AppError> {
        self.keys.verify_access(token).map_err(AppError::InvalidToken)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, AppError> {
        self.keys.verify_refresh(token).map_err(AppError::InvalidToken)
    }

    /// Trades the presented refresh token for a new pair.
    ///
    /// Only the token currently in the user's slot is accepted. The swap is a
    /// conditional write keyed on the presented value, so of two concurrent
    /// rotations with the same token exactly one wins.
    #[instrument(skip_all)]
    pub async fn rotate_on_refresh(&self, presented: &str) -> Result<TokenPair, AppError> {
        let claims = self.verify_refresh_token(presented)?;

        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "refresh for unknown user");
                AppError::unauthorized("Invalid refresh token")
            })?;

        match user.refresh_token.as_deref() {
            None => {
                warn!(user_id = %user.id, "refresh after logout");
                return Err(AppError::unauthorized("Refresh token has been revoked"));
            }
            Some(current) if current != presented => {
                warn!(user_id = %user.id, "superseded refresh token presented");
                return Err(AppError::TokenReuse);
            }
            Some(_) => {}
        }

        let pair = self.mint_pair(user.id)?;
        let swapped = self
            .store
            .swap_refresh_token(user.id, presented, &pair.refresh_token)
            .await
            .map_err(AppError::TokenIssuance)?;
        if !swapped {
            warn!(user_id = %user.id, "lost refresh race");
            return Err(AppError::TokenReuse);
        }

        info!(user_id = %user.id, "refresh token rotated");
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn issue_persists_refresh_token_in_slot() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;

        let pair = h.state.tokens.issue_token_pair(user.id).await.unwrap();

        let stored = h.store.get(user.id).unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));
        let claims = h.state.tokens.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn reissue_overwrites_previous_slot() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;

        let first = h.state.tokens.issue_token_pair(user.id).await.unwrap();
        let second = h.state.tokens.issue_token_pair(user.id).await.unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        let err = h
            .state
            .tokens
            .rotate_on_refresh(&first.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenReuse));
    }

    #[tokio::test]
    async fn issue_for_missing_user_is_a_server_error() {
        let h = Harness::new();
        let err = h.state.tokens.issue_token_pair(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::TokenIssuance(_)));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn issue_fails_when_store_rejects_write() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;
        h.store.fail_writes.store(true, Ordering::SeqCst);

        let err = h.state.tokens.issue_token_pair(user.id).await.unwrap_err();
        assert!(matches!(err, AppError::TokenIssuance(_)));
    }

    #[tokio::test]
    async fn rotation_supersedes_the_presented_token() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;
        let original = h.state.tokens.issue_token_pair(user.id).await.unwrap();

        let rotated = h
            .state
            .tokens
            .rotate_on_refresh(&original.refresh_token)
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, original.refresh_token);
        assert_eq!(
            h.store.get(user.id).unwrap().refresh_token.as_deref(),
            Some(rotated.refresh_token.as_str())
        );

        let err = h
            .state
            .tokens
            .rotate_on_refresh(&original.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenReuse));

        // the replacement keeps working
        h.state
            .tokens
            .rotate_on_refresh(&rotated.refresh_token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cleared_slot_rejects_as_unauthorized() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;
        let pair = h.state.tokens.issue_token_pair(user.id).await.unwrap();
        h.store.save_refresh_token(user.id, None).await.unwrap();

        let err = h
            .state
            .tokens
            .rotate_on_refresh(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn token_for_unknown_user_is_unauthorized() {
        let h = Harness::new();
        let keys = JwtKeys::from_config(&h.state.config.jwt);
        let token = keys.sign_refresh(Uuid::new_v4()).unwrap();

        let err = h.state.tokens.rotate_on_refresh(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_or_access_tokens_are_invalid() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;
        let pair = h.state.tokens.issue_token_pair(user.id).await.unwrap();

        let err = h.state.tokens.rotate_on_refresh("garbage").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));

        let err = h
            .state
            .tokens
            .rotate_on_refresh(&pair.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotations_have_one_winner() {
        let h = Harness::new();
        let user = h.seed_user("bob", "bob@example.com", "pw-bob-123").await;
        let pair = h.state.tokens.issue_token_pair(user.id).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let tokens = h.state.tokens.clone();
            let presented = pair.refresh_token.clone();
            tasks.push(tokio::spawn(async move {
                tokens.rotate_on_refresh(&presented).await
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(p) => winners.push(p),
                Err(e) => assert!(matches!(e, AppError::TokenReuse)),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(
            h.store.get(user.id).unwrap().refresh_token.as_deref(),
            Some(winners[0].refresh_token.as_str())
        );
    }
}
