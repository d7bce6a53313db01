use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::password;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub handle: String, // always lower-case
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>, // the single active refresh token
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_password_correct(&self, plain: &str) -> anyhow::Result<bool> {
        password::verify_password(plain, &self.password_hash)
    }
}

/// Fields needed to create a user. The password is still plain text here;
/// the store hashes it on save.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub handle: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_image_url: Option<String>,
}

/// Raised by a store when a handle or email is already taken.
#[derive(Debug, thiserror::Error)]
#[error("handle or email already taken")]
pub struct DuplicateUser;

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            user_name: u.handle,
            email: u.email,
            full_name: u.full_name,
            avatar: u.avatar_url,
            cover_image: u.cover_image_url,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
