use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{dto::LoginRequest, tokens::TokenPair};
use crate::{
    error::AppError,
    state::AppState,
    users::repo_types::PublicUser,
};

/// Outcome of a successful login: the caller installs `tokens` as cookies.
#[derive(Debug)]
pub struct SessionGrant {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

#[instrument(skip_all)]
pub async fn login(state: &AppState, req: &LoginRequest) -> Result<SessionGrant, AppError> {
    let handle = non_blank(req.user_name.as_deref()).map(str::to_lowercase);
    let email = non_blank(req.email.as_deref()).map(str::to_lowercase);
    if handle.is_none() && email.is_none() {
        return Err(AppError::validation("userName or email is required"));
    }

    let user = state
        .store
        .find_by_handle_or_email(handle.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| {
            warn!(handle = ?handle, email = ?email, "login for unknown user");
            AppError::not_found("User does not exist")
        })?;

    if !user.is_password_correct(&req.password)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid user credentials"));
    }

    let tokens = state.tokens.issue_token_pair(user.id).await?;
    info!(user_id = %user.id, handle = %user.handle, "user logged in");
    Ok(SessionGrant {
        user: user.into(),
        tokens,
    })
}

/// Empties the user's refresh-token slot. Logging out twice is fine.
#[instrument(skip(state))]
pub async fn logout(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    let cleared = state.store.save_refresh_token(user_id, None).await?;
    if cleared {
        info!(%user_id, "user logged out");
    } else {
        warn!(%user_id, "logout for missing user");
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn refresh(state: &AppState, presented: Option<&str>) -> Result<TokenPair, AppError> {
    let presented =
        non_blank(presented).ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;
    state.tokens.rotate_on_refresh(presented).await
}
