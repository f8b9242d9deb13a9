//! Upload panel state
//!
//! Tracks the document upload side-channel as a front-end sees it: which files
//! are selected, the name to display for the selection, and a one-line status.
//! The HTTP call itself lives outside the core; this module only records the
//! request/response boundary.

use crate::error::SessionError;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Status line shown next to the upload control.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    NoFiles,
    Uploading,
    Complete,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UploadStatus::Idle => "",
            UploadStatus::NoFiles => "No files selected.",
            UploadStatus::Uploading => "Uploading PDF...",
            UploadStatus::Complete => "Upload Complete!",
            UploadStatus::Failed => "Error uploading files.",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Default)]
pub struct UploadPanel {
    selected: Vec<PathBuf>,
    file_name: Option<String>,
    status: UploadStatus,
}

impl UploadPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the selection. An empty selection keeps the previous one.
    pub fn select_files(&mut self, files: Vec<PathBuf>) {
        let Some(first) = files.first() else {
            return;
        };
        self.file_name = Some(
            first
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| first.display().to_string()),
        );
        self.selected = files;
    }

    /// Starts an upload of the current selection.
    ///
    /// Returns the files to send, or `None` when there is nothing to upload or an
    /// upload is already running.
    pub fn begin_upload(&mut self) -> Option<Vec<PathBuf>> {
        if self.status == UploadStatus::Uploading {
            warn!("Upload already in progress; ignoring request.");
            return None;
        }
        if self.selected.is_empty() {
            self.status = UploadStatus::NoFiles;
            return None;
        }
        self.status = UploadStatus::Uploading;
        Some(self.selected.clone())
    }

    /// Records the outcome of the upload started by [`UploadPanel::begin_upload`].
    pub fn finish_upload(&mut self, outcome: Result<(), SessionError>) {
        match outcome {
            Ok(()) => {
                info!(files = self.selected.len(), "Files uploaded successfully.");
                self.status = UploadStatus::Complete;
            }
            Err(e) => {
                error!(error = %e, "Error uploading files.");
                self.status = UploadStatus::Failed;
            }
        }
    }

    pub fn status(&self) -> &UploadStatus {
        &self.status
    }

    pub fn selected_file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn selected_files(&self) -> &[PathBuf] {
        &self.selected
    }
}
