use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderName},
    response::{AppendHeaders, IntoResponse},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::{
    cookies::{get_cookie, CookieOptions, REFRESH_COOKIE_NAME},
    dto::{LoginRequest, LoginResponse, RefreshRequest},
    extractors::AuthUser,
    session,
    tokens::TokenPair,
};
use crate::{error::AppError, response::ApiResponse, state::AppState};

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/refresh-token", post(refresh_token))
}

fn set_session_cookies(
    state: &AppState,
    pair: &TokenPair,
) -> AppendHeaders<[(HeaderName, String); 2]> {
    let [access, refresh] = CookieOptions::new(state.config.cookie_secure).set_session(
        pair,
        state.tokens.access_ttl(),
        state.tokens.refresh_ttl(),
    );
    AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)])
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let grant = session::login(&state, &payload).await?;
    let cookies = set_session_cookies(&state, &grant.tokens);
    Ok((
        cookies,
        ApiResponse::ok(
            LoginResponse {
                user: grant.user,
                access_token: grant.tokens.access_token,
                refresh_token: grant.tokens.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    session::logout(&state, user_id).await?;
    let [access, refresh] = CookieOptions::new(state.config.cookie_secure).clear_session();
    Ok((
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        ApiResponse::ok(serde_json::json!({}), "User logged out"),
    ))
}

/// Cookie first, then the JSON body. A missing or unparsable body is fine
/// when the cookie is present.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let from_body = body.and_then(|Json(b)| b.refresh_token);
    let presented = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .map(str::to_string)
        .or(from_body);

    let pair = session::refresh(&state, presented.as_deref()).await?;
    let cookies = set_session_cookies(&state, &pair);
    Ok((cookies, ApiResponse::ok(pair, "Access token refreshed")))
}
