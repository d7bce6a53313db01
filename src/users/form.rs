use std::{collections::HashMap, path::Path};

use axum::extract::Multipart;
use tracing::{debug, warn};

use crate::{error::AppError, uploads::TempUpload};

/// A multipart body with its file parts already spooled to disk.
///
/// Files that are never taken are removed when the form is dropped.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, TempUpload>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart, upload_dir: &Path) -> Result<Self, AppError> {
        let mut form = Self::default();
        loop {
            let field = match mp.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "malformed multipart body");
                    return Err(AppError::validation("Malformed multipart body"));
                }
            };
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::validation("Malformed multipart body"))?;
                // browsers send an empty part for an untouched file input
                if data.is_empty() {
                    continue;
                }
                let upload = TempUpload::spool(upload_dir, &content_type, data).await?;
                debug!(field = %name, bytes = upload.len(), "file part spooled");
                // first file per field wins
                form.files.entry(name).or_insert(upload);
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|_| AppError::validation("Malformed multipart body"))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempUpload> {
        self.files.remove(name)
    }
}
