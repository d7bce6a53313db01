//! In-process stand-ins for the database and the media store.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    state::AppState,
    storage::{MediaAsset, MediaStore},
    uploads::TempUpload,
    users::{
        password,
        repo::CredentialStore,
        repo_types::{DuplicateUser, NewUser, User, UserChanges},
    },
};

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
    pub fail_create: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn by_handle(&self, handle: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.handle == handle)
            .cloned()
    }

    pub fn by_email(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    fn check_writes(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_writes.load(Ordering::SeqCst), "store is read-only");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_handle_or_email(
        &self,
        handle: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| {
                handle.is_some_and(|h| u.handle == h) || email.is_some_and(|e| u.email == e)
            })
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        anyhow::ensure!(!self.fail_create.load(Ordering::SeqCst), "insert failed");
        let password_hash = password::hash_password(&new_user.password)?;
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.handle == new_user.handle || u.email == new_user.email)
        {
            return Err(DuplicateUser.into());
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            handle: new_user.handle,
            email: new_user.email,
            full_name: new_user.full_name,
            password_hash,
            avatar_url: new_user.avatar_url,
            cover_image_url: new_user.cover_image_url,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_fields(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<Option<User>> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        if let Some(email) = &changes.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(DuplicateUser.into());
            }
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = changes.full_name {
            user.full_name = v;
        }
        if let Some(v) = changes.email {
            user.email = v;
        }
        if let Some(v) = changes.avatar_url {
            user.avatar_url = v;
        }
        if let Some(v) = changes.cover_image_url {
            user.cover_image_url = Some(v);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn save_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<bool> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        Ok(match users.get_mut(&id) {
            Some(user) => {
                user.refresh_token = token.map(str::to_string);
                true
            }
            None => false,
        })
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> anyhow::Result<bool> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        Ok(match users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(current) => {
                user.refresh_token = Some(next.to_string());
                true
            }
            _ => false,
        })
    }

    async fn set_password(&self, id: Uuid, plain: &str) -> anyhow::Result<bool> {
        self.check_writes()?;
        let hash = password::hash_password(plain)?;
        let mut users = self.users.lock().unwrap();
        Ok(match users.get_mut(&id) {
            Some(user) => {
                user.password_hash = hash;
                true
            }
            None => false,
        })
    }
}

/// Records uploads instead of sending them anywhere.
#[derive(Default)]
pub struct FakeMediaStore {
    pub uploaded: Mutex<Vec<MediaAsset>>,
    pub deleted: Mutex<Vec<String>>,
    pub spooled_paths: Mutex<Vec<PathBuf>>,
    /// Fail the n-th upload (0-based) and every one after it.
    pub fail_from: Mutex<Option<usize>>,
}

impl FakeMediaStore {
    pub fn fail_all(&self) {
        *self.fail_from.lock().unwrap() = Some(0);
    }

    pub fn fail_after(&self, successes: usize) {
        *self.fail_from.lock().unwrap() = Some(successes);
    }

    pub fn upload_count(&self) -> usize {
        self.uploaded.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn upload(&self, file: TempUpload) -> anyhow::Result<MediaAsset> {
        self.spooled_paths
            .lock()
            .unwrap()
            .push(file.path().to_path_buf());
        let attempt = self.uploaded.lock().unwrap().len();
        if let Some(n) = *self.fail_from.lock().unwrap() {
            if attempt >= n {
                anyhow::bail!("media host unavailable");
            }
        }
        let key = format!("users/{}.{}", Uuid::new_v4(), file.extension());
        let asset = MediaAsset {
            url: format!("https://media.local/fake/{}", key),
            key,
        };
        self.uploaded.lock().unwrap().push(asset.clone());
        Ok(asset)
    }

    async fn delete(&self, url: &str) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// An [`AppState`] wired to in-memory collaborators, with handles kept for assertions.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryCredentialStore>,
    pub media: Arc<FakeMediaStore>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryCredentialStore::default());
        let media = Arc::new(FakeMediaStore::default());
        let state = AppState::from_parts(
            Arc::new(AppConfig::for_tests()),
            store.clone(),
            media.clone(),
        );
        Self {
            state,
            store,
            media,
        }
    }

    pub async fn image(&self) -> TempUpload {
        TempUpload::spool(
            &self.state.config.upload.dir,
            "image/png",
            Bytes::from_static(b"\x89PNG fake image"),
        )
        .await
        .expect("spool test image")
    }

    /// Creates a user directly in the store, bypassing the workflow.
    pub async fn seed_user(&self, handle: &str, email: &str, password: &str) -> User {
        self.store
            .create(NewUser {
                handle: handle.into(),
                email: email.into(),
                full_name: "Seeded User".into(),
                password: password.into(),
                avatar_url: "https://media.local/fake/seed.png".into(),
                cover_image_url: None,
            })
            .await
            .expect("seed user")
    }
}
