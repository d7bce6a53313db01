use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ChangePasswordRequest, RegisterForm, UpdateAccountRequest},
    form::MultipartForm,
    repo_types::PublicUser,
    services,
};
use crate::{auth::extractors::AuthUser, error::AppError, response::ApiResponse, state::AppState};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/change-password", post(change_password))
        .route("/users/current-user", get(current_user))
        .route("/users/update-account", patch(update_account))
        .route("/users/avatar", patch(update_avatar))
        .route("/users/cover-image", patch(update_cover_image))
}

type Envelope<T> = Result<ApiResponse<T>, AppError>;

#[instrument(skip_all)]
pub async fn register(State(state): State<AppState>, mp: Multipart) -> Envelope<PublicUser> {
    let mut form = MultipartForm::read(mp, &state.config.upload.dir).await?;
    let input = RegisterForm {
        full_name: form.take_text("fullName"),
        email: form.take_text("email"),
        user_name: form.take_text("userName"),
        password: form.take_text("password"),
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("coverImage"),
    };
    let user = services::register_user(&state, input).await?;
    Ok(ApiResponse::new(StatusCode::CREATED, user, "User registered successfully"))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Envelope<serde_json::Value> {
    services::change_password(&state, user_id, payload).await?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Password changed successfully"))
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Envelope<PublicUser> {
    let user = services::current_user(&state, user_id).await?;
    Ok(ApiResponse::ok(user, "Current user fetched successfully"))
}

#[instrument(skip(state, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Envelope<PublicUser> {
    let user = services::update_profile_fields(&state, user_id, payload).await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Envelope<PublicUser> {
    let mut form = MultipartForm::read(mp, &state.config.upload.dir).await?;
    let user = services::update_avatar(&state, user_id, form.take_file("avatar")).await?;
    Ok(ApiResponse::ok(user, "Avatar updated successfully"))
}

#[instrument(skip(state, mp))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Envelope<PublicUser> {
    let mut form = MultipartForm::read(mp, &state.config.upload.dir).await?;
    let user = services::update_cover_image(&state, user_id, form.take_file("coverImage")).await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}
