//! Multipart form reading
//!
//! Text parts are collected into a map; file parts are spooled to temporary
//! storage as they stream in, so large uploads never sit in memory.

use axum::extract::Multipart;
use std::collections::HashMap;
use tracing::debug;
use vizrec_core::{SpooledUpload, UploadSpool};

use crate::routes::AppError;

/// A decoded multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    texts: HashMap<String, String>,
    files: Vec<(String, SpooledUpload)>,
}

impl UploadForm {
    /// Drain a multipart body
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                form.texts.insert(name, value);
                continue;
            };
            let content_type = field.content_type().map(str::to_string);

            let mut spool = UploadSpool::new()?;
            while let Some(chunk) = field.chunk().await? {
                spool.write_chunk(&chunk).await?;
            }

            // A file input left empty in a browser form
            if file_name.is_empty() && spool.is_empty() {
                debug!("Skipping empty file part '{}'", name);
                continue;
            }

            debug!("Spooled file part '{}' ({} bytes)", name, spool.len());
            let upload = spool.finish(Some(file_name), content_type).await?;
            form.files.push((name, upload));
        }

        Ok(form)
    }

    /// Take a required text field
    pub fn require(&mut self, name: &str) -> Result<String, AppError> {
        self.texts
            .remove(name)
            .ok_or_else(|| AppError::InvalidRequest(format!("Missing form field '{}'", name)))
    }

    /// Take an optional text field
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.texts.remove(name)
    }

    /// Take the file part with the given name, or else the first file part
    pub fn take_file(&mut self, preferred: &str) -> Option<SpooledUpload> {
        if self.files.is_empty() {
            return None;
        }
        let index = self
            .files
            .iter()
            .position(|(name, _)| name == preferred)
            .unwrap_or(0);
        Some(self.files.remove(index).1)
    }

    /// Take every file part as `(part name, upload)`
    pub fn take_files(&mut self) -> Vec<(String, SpooledUpload)> {
        std::mem::take(&mut self.files)
    }
}
