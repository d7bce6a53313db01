use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use super::cookies::{get_cookie, ACCESS_COOKIE_NAME};
use crate::{error::AppError, state::AppState};

/// Extracts and validates the access token, returning the user ID.
///
/// The `accessToken` cookie wins; an `Authorization: Bearer` header is the fallback.
pub struct AuthUser(pub Uuid);

fn bearer(parts: &Parts) -> Option<&str> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, ACCESS_COOKIE_NAME)
            .or_else(|| bearer(parts))
            .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

        let claims = state.tokens.verify_access_token(token).map_err(|e| {
            warn!("invalid or expired access token");
            e
        })?;

        Ok(AuthUser(claims.sub))
    }
}
