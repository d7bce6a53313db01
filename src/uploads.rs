use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use bytes::Bytes;
use tempfile::NamedTempFile;

/// A client file spooled to local disk while it waits for the media store.
///
/// The file lives exactly as long as this value: dropping it removes the file,
/// so every exit path of an upload cleans up after itself.
#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
    content_type: String,
    len: usize,
}

impl TempUpload {
    pub async fn spool(dir: &Path, content_type: &str, body: Bytes) -> anyhow::Result<Self> {
        let dir: PathBuf = dir.to_path_buf();
        let len = body.len();
        let file = tokio::task::spawn_blocking(move || -> anyhow::Result<NamedTempFile> {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create upload dir {}", dir.display()))?;
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(&dir)
                .context("create temp upload")?;
            file.write_all(&body).context("write temp upload")?;
            file.flush().context("flush temp upload")?;
            Ok(file)
        })
        .await
        .context("spool task panicked")??;

        Ok(Self {
            file,
            content_type: content_type.to_string(),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn extension(&self) -> &'static str {
        ext_from_mime(&self.content_type).unwrap_or("bin")
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
