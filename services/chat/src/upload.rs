//! Document Upload Client
//!
//! Sends selected documents to the chat service's multipart endpoint. The
//! session runtime only sees the [`Uploader`] trait, so tests can swap the HTTP
//! client for a stub.

use async_trait::async_trait;
use docuchat_core::SessionError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Multipart field name the service reads documents from.
pub const FILES_FIELD: &str = "files";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected with status {0}")]
    Status(reqwest::StatusCode),
}

impl From<UploadError> for SessionError {
    fn from(err: UploadError) -> Self {
        SessionError::UploadFailed(err.to_string())
    }
}

/// One stored document as reported by the service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UploadedFile {
    #[serde(default)]
    pub doc_id: String,
    pub filename: String,
    #[serde(default)]
    pub num_chunks: u64,
}

/// The service's answer to a successful upload.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UploadReceipt {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub uploaded_files: Vec<UploadedFile>,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads `files` in a single request.
    async fn upload(&self, files: &[PathBuf]) -> Result<UploadReceipt, UploadError>;
}

/// An [`Uploader`] that POSTs `multipart/form-data` with `reqwest`.
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, files: &[PathBuf]) -> Result<UploadReceipt, UploadError> {
        let mut form = Form::new();
        for path in files {
            let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
                path: path.clone(),
                source,
            })?;
            let part = Part::bytes(bytes)
                .file_name(file_name(path))
                .mime_str(content_type_for(path))?;
            form = form.part(FILES_FIELD, part);
        }

        info!(url = %self.url, count = files.len(), "Uploading documents.");
        let response = self.client.post(&self.url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Document upload rejected.");
            return Err(UploadError::Status(status));
        }

        let receipt: UploadReceipt = response.json().await?;
        info!(
            status = %receipt.status,
            stored = receipt.uploaded_files.len(),
            "Documents uploaded."
        );
        Ok(receipt)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

/// Guesses a content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
