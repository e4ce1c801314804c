//! Per-run working directory.
//!
//! Every run writes its upload, page images, audio clips, segments and final
//! video below `<work_dir>/<run_id>/`, so two runs never touch the same files.

use super::error::PipelineError;
use crate::types::SourceDocument;
use std::path::{Path, PathBuf};

const VIDEO_FILE_NAME: &str = "slideshow.mp4";

#[derive(Debug, Clone)]
pub struct RunWorkspace {
    run_id: String,
    root: PathBuf,
}

impl RunWorkspace {
    pub async fn create(work_dir: &Path, run_id: &str) -> Result<Self, PipelineError> {
        let workspace = Self {
            run_id: run_id.to_string(),
            root: work_dir.join(run_id),
        };

        for dir in [
            workspace.source_dir(),
            workspace.images_dir(),
            workspace.audio_dir(),
            workspace.segments_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PipelineError::workspace(&dir, e))?;
        }

        Ok(workspace)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join("segments")
    }

    pub fn video_path(&self) -> PathBuf {
        self.root.join(VIDEO_FILE_NAME)
    }

    /// Persist the uploaded bytes under a sanitized version of the client file name.
    pub async fn save_source(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<SourceDocument, PipelineError> {
        let path = self.source_dir().join(sanitize_file_name(original_name));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::workspace(&path, e))?;

        Ok(SourceDocument {
            original_name: original_name.to_string(),
            path,
            size_bytes: bytes.len() as u64,
        })
    }

    pub async fn remove(&self) -> Result<(), PipelineError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::workspace(&self.root, e)),
        }
    }
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]`, so client names can never escape the source directory.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
