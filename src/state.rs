use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::auth::{jwt::JwtKeys, tokens::TokenService};
use crate::config::AppConfig;
use crate::storage::{MediaStore, S3MediaStore};
use crate::users::repo::{CredentialStore, PgCredentialStore};

/// Applies the embedded migrations. A checksum mismatch or an unreachable
/// schema is fatal.
pub async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub media: Arc<dyn MediaStore>,
    pub tokens: TokenService,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        run_migrations(&db).await?;

        let store = Arc::new(PgCredentialStore::new(db)) as Arc<dyn CredentialStore>;
        let media = Arc::new(S3MediaStore::new(&config.media).await?) as Arc<dyn MediaStore>;

        Ok(Self::from_parts(config, store, media))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        let tokens = TokenService::new(JwtKeys::from_config(&config.jwt), store.clone());
        Self {
            config,
            store,
            media,
            tokens,
        }
    }
}
