use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::MediaConfig, uploads::TempUpload};

/// A stored image and the URL it is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub key: String,
    pub url: String,
}

/// Durable image hosting.
///
/// `upload` takes ownership of the spooled file, so the local copy is gone
/// once the call returns, whether it succeeded or not.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, file: TempUpload) -> anyhow::Result<MediaAsset>;
    async fn delete(&self, url: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    public_url: String,
    timeout: Duration,
}

impl S3MediaStore {
    pub async fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_url: cfg.public_url.clone(),
            timeout: Duration::from_secs(cfg.upload_timeout_secs),
        })
    }

    fn key_for(&self, url: &str) -> Option<String> {
        key_from_url(&self.public_url, url)
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let send = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send();
        tokio::time::timeout(self.timeout, send)
            .await
            .with_context(|| format!("s3 put_object {} timed out", key))?
            .with_context(|| format!("s3 put_object {}", key))?;
        Ok(())
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn upload(&self, file: TempUpload) -> anyhow::Result<MediaAsset> {
        let body = tokio::fs::read(file.path())
            .await
            .with_context(|| format!("read spooled upload {}", file.path().display()))?;
        let key = format!("users/{}.{}", Uuid::new_v4(), file.extension());
        self.put(&key, Bytes::from(body), file.content_type()).await?;
        drop(file);

        let url = format!("{}/{}", self.public_url, key);
        debug!(%key, %url, "media uploaded");
        Ok(MediaAsset { key, url })
    }

    async fn delete(&self, url: &str) -> anyhow::Result<()> {
        let Some(key) = self.key_for(url) else {
            warn!(%url, "url is not served by this media store");
            anyhow::bail!("url {} is not served by this media store", url);
        };
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {}", key))?;
        Ok(())
    }
}

fn key_from_url(public_url: &str, url: &str) -> Option<String> {
    url.strip_prefix(public_url)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}
