use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ChangePasswordRequest, RegisterForm, UpdateAccountRequest},
    repo_types::{DuplicateUser, NewUser, PublicUser, UserChanges},
};
use crate::{error::AppError, state::AppState, storage::MediaAsset, uploads::TempUpload};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when missing or whitespace-only.
fn required(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Like [`required`], but keeps the value exactly as given.
fn required_verbatim(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Removes already-uploaded images after a later registration step failed.
async fn discard_uploads(state: &AppState, assets: &[&MediaAsset]) {
    for asset in assets {
        if let Err(e) = state.media.delete(&asset.url).await {
            warn!(error = %e, url = %asset.url, "failed to discard orphaned upload");
        }
    }
}

#[instrument(skip_all)]
pub async fn register_user(state: &AppState, form: RegisterForm) -> Result<PublicUser, AppError> {
    let RegisterForm {
        full_name,
        email,
        user_name,
        password,
        avatar,
        cover_image,
    } = form;

    let (Some(full_name), Some(email), Some(user_name), Some(password)) = (
        required(full_name),
        required(email),
        required(user_name),
        required_verbatim(password),
    ) else {
        warn!("registration with missing fields");
        return Err(AppError::validation("All fields are required"));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    let handle = user_name.to_lowercase();

    if state
        .store
        .find_by_handle_or_email(Some(&handle), Some(&email))
        .await?
        .is_some()
    {
        warn!(handle = %handle, email = %email, "handle or email already registered");
        return Err(AppError::conflict("User with email or username already exists"));
    }

    let avatar = avatar.ok_or_else(|| AppError::validation("Avatar file is required"))?;
    let avatar = state.media.upload(avatar).await.map_err(|e| {
        error!(error = %e, "avatar upload failed");
        AppError::upload("Avatar file upload failed")
    })?;

    let cover = match cover_image {
        Some(file) => match state.media.upload(file).await {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(error = %e, "cover image upload failed; continuing without it");
                None
            }
        },
        None => None,
    };

    let created = state
        .store
        .create(NewUser {
            handle: handle.clone(),
            email: email.clone(),
            full_name,
            password,
            avatar_url: avatar.url.clone(),
            cover_image_url: cover.as_ref().map(|c| c.url.clone()),
        })
        .await;

    let user = match created {
        Ok(user) => user,
        Err(e) => {
            let uploaded: Vec<&MediaAsset> =
                std::iter::once(&avatar).chain(cover.as_ref()).collect();
            discard_uploads(state, &uploaded).await;
            if e.downcast_ref::<DuplicateUser>().is_some() {
                warn!(handle = %handle, email = %email, "lost registration race");
                return Err(AppError::conflict("User with email or username already exists"));
            }
            return Err(AppError::Internal(e.context("create user")));
        }
    };

    let user = state.store.find_by_id(user.id).await?.ok_or_else(|| {
        error!(user_id = %user.id, "created user vanished");
        AppError::Internal(anyhow::anyhow!(
            "Something went wrong while registering the user"
        ))
    })?;

    info!(user_id = %user.id, handle = %user.handle, email = %user.email, "user registered");
    Ok(user.into())
}

#[instrument(skip(state))]
pub async fn current_user(state: &AppState, user_id: Uuid) -> Result<PublicUser, AppError> {
    let user = state.store.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(%user_id, "token for deleted user");
        AppError::unauthorized("Invalid access token")
    })?;
    Ok(user.into())
}

#[instrument(skip(state, req))]
pub async fn update_profile_fields(
    state: &AppState,
    user_id: Uuid,
    req: UpdateAccountRequest,
) -> Result<PublicUser, AppError> {
    let (Some(full_name), Some(email)) = (required(req.full_name), required(req.email)) else {
        return Err(AppError::validation("All fields are required"));
    };
    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }

    if let Some(other) = state.store.find_by_handle_or_email(None, Some(&email)).await? {
        if other.id != user_id {
            warn!(%user_id, email = %email, "email belongs to another user");
            return Err(AppError::conflict("Email is already in use"));
        }
    }

    let changes = UserChanges {
        full_name: Some(full_name),
        email: Some(email),
        ..Default::default()
    };
    let user = match state.store.update_fields(user_id, changes).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AppError::not_found("User does not exist")),
        Err(e) if e.downcast_ref::<DuplicateUser>().is_some() => {
            return Err(AppError::conflict("Email is already in use"));
        }
        Err(e) => return Err(e.into()),
    };

    info!(%user_id, "account details updated");
    Ok(user.into())
}

#[derive(Debug, Clone, Copy)]
enum ImageSlot {
    Avatar,
    Cover,
}

impl ImageSlot {
    fn label(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "Avatar",
            ImageSlot::Cover => "Cover image",
        }
    }
}

async fn replace_image(
    state: &AppState,
    user_id: Uuid,
    file: Option<TempUpload>,
    slot: ImageSlot,
) -> Result<PublicUser, AppError> {
    let file = file
        .ok_or_else(|| AppError::validation(format!("{} file is missing", slot.label())))?;
    let asset = state.media.upload(file).await.map_err(|e| {
        error!(error = %e, ?slot, "image upload failed");
        AppError::upload(format!("Error while uploading {}", slot.label().to_lowercase()))
    })?;

    let changes = match slot {
        ImageSlot::Avatar => UserChanges {
            avatar_url: Some(asset.url.clone()),
            ..Default::default()
        },
        ImageSlot::Cover => UserChanges {
            cover_image_url: Some(asset.url.clone()),
            ..Default::default()
        },
    };
    let user = match state.store.update_fields(user_id, changes).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            discard_uploads(state, &[&asset]).await;
            return Err(AppError::not_found("User does not exist"));
        }
        Err(e) => {
            discard_uploads(state, &[&asset]).await;
            return Err(e.context("store replaced image").into());
        }
    };

    info!(%user_id, ?slot, key = %asset.key, url = %asset.url, "image replaced");
    Ok(user.into())
}

pub async fn update_avatar(
    state: &AppState,
    user_id: Uuid,
    file: Option<TempUpload>,
) -> Result<PublicUser, AppError> {
    replace_image(state, user_id, file, ImageSlot::Avatar).await
}

pub async fn update_cover_image(
    state: &AppState,
    user_id: Uuid,
    file: Option<TempUpload>,
) -> Result<PublicUser, AppError> {
    replace_image(state, user_id, file, ImageSlot::Cover).await
}

#[instrument(skip(state, req))]
pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    req: ChangePasswordRequest,
) -> Result<(), AppError> {
    if req.new_password.trim().is_empty() {
        return Err(AppError::validation("New password is required"));
    }

    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User does not exist"))?;

    if !user.is_password_correct(&req.old_password)? {
        warn!(%user_id, "password change with wrong old password");
        return Err(AppError::validation("Invalid Password"));
    }

    if !state.store.set_password(user.id, &req.new_password).await? {
        return Err(AppError::not_found("User does not exist"));
    }
    info!(%user_id, "password changed");
    Ok(())
}
