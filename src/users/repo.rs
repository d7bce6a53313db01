use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    password,
    repo_types::{DuplicateUser, NewUser, User, UserChanges},
};

/// Persistence for user records, including the refresh-token slot.
///
/// Implementations must enforce handle and email uniqueness and report a
/// violation as [`DuplicateUser`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_handle_or_email(
        &self,
        handle: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Hashes `new_user.password` and inserts the record.
    async fn create(&self, new_user: NewUser) -> anyhow::Result<User>;

    /// Applies the set fields and returns the updated record, `None` if no such user.
    async fn update_fields(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<Option<User>>;

    /// Overwrites the refresh-token slot without touching anything else.
    /// Returns whether a user row was written.
    async fn save_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<bool>;

    /// Replaces the slot with `next` only while it still holds `current`.
    /// This is a single conditional write; `false` means the slot moved on.
    async fn swap_refresh_token(&self, id: Uuid, current: &str, next: &str)
        -> anyhow::Result<bool>;

    /// Hashes and stores a new password.
    async fn set_password(&self, id: Uuid, plain: &str) -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str = "id, handle, email, full_name, password_hash, avatar_url, \
                            cover_image_url, refresh_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique(e: sqlx::Error, what: &'static str) -> anyhow::Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => DuplicateUser.into(),
        _ => anyhow::Error::new(e).context(what),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_handle_or_email(
        &self,
        handle: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NOT NULL AND handle = $1)
               OR ($2::text IS NOT NULL AND email = $2)
            LIMIT 1
            "#
        ))
        .bind(handle)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by handle or email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let hash = password::hash_password(&new_user.password)?;
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (handle, email, full_name, password_hash, avatar_url, cover_image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.handle)
        .bind(&new_user.email)
        .bind(&new_user.full_name)
        .bind(&hash)
        .bind(&new_user.avatar_url)
        .bind(&new_user.cover_image_url)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique(e, "insert user"))
    }

    async fn update_fields(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET full_name       = COALESCE($2, full_name),
                   email           = COALESCE($3, email),
                   avatar_url      = COALESCE($4, avatar_url),
                   cover_image_url = COALESCE($5, cover_image_url),
                   updated_at      = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.full_name)
        .bind(changes.email)
        .bind(changes.avatar_url)
        .bind(changes.cover_image_url)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_unique(e, "update user fields"))
    }

    async fn save_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET refresh_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await
            .context("save refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET refresh_token = $3 WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(&self.db)
        .await
        .context("swap refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_password(&self, id: Uuid, plain: &str) -> anyhow::Result<bool> {
        let hash = password::hash_password(plain)?;
        let res =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(&hash)
                .execute(&self.db)
                .await
                .context("update password")?;
        Ok(res.rows_affected() == 1)
    }
}
