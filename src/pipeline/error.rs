//! Failure taxonomy of a deck-to-video run.
//!
//! Every variant aborts the run. Slide-level variants carry the 0-based slide
//! index so callers can tell which slide broke the run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded file is not a format the rasterizer understands.
    #[error("Unsupported document format '{file_name}'. Please upload a PDF or PPT file.")]
    UnsupportedFormat { file_name: String },

    /// The document was recognised but could not be turned into images.
    #[error("Rasterization of '{}' failed: {}", .path.display(), .detail)]
    RasterizationFailed { path: PathBuf, detail: String },

    #[error("Narration generation failed for slide {}: {}", .index + 1, .detail)]
    GenerationFailed { index: usize, detail: String },

    #[error("Speech synthesis failed for slide {}: {}", .index + 1, .detail)]
    SynthesisFailed { index: usize, detail: String },

    #[error("Could not determine audio duration for slide {}: {}", .index + 1, .detail)]
    DurationProbeFailed { index: usize, detail: String },

    #[error("Video assembly failed: {detail}")]
    AssemblyFailed { detail: String },

    /// Slide, narration and audio sequences no longer line up by index.
    #[error("Stage outputs are misaligned: {detail}")]
    Misaligned { detail: String },

    #[error("Run workspace error at '{}': {}", .path.display(), .source)]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Name of the stage that failed, as reported to clients.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } | Self::RasterizationFailed { .. } => "rasterize",
            Self::GenerationFailed { .. } => "narrate",
            Self::SynthesisFailed { .. } | Self::DurationProbeFailed { .. } => "synthesize",
            Self::AssemblyFailed { .. } | Self::Misaligned { .. } => "assemble",
            Self::Workspace { .. } => "workspace",
        }
    }

    /// True when an upstream service (text or speech) caused the failure.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::GenerationFailed { .. } | Self::SynthesisFailed { .. })
    }

    pub fn slide_index(&self) -> Option<usize> {
        match self {
            Self::GenerationFailed { index, .. }
            | Self::SynthesisFailed { index, .. }
            | Self::DurationProbeFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_use_one_based_slides() {
        let err = PipelineError::SynthesisFailed {
            index: 1,
            detail: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "Speech synthesis failed for slide 2: quota");
        assert_eq!(err.stage(), "synthesize");
        assert_eq!(err.slide_index(), Some(1));
        assert!(err.is_upstream());
    }

    #[test]
    fn test_stage_names() {
        let unsupported = PipelineError::UnsupportedFormat {
            file_name: "a.txt".to_string(),
        };
        assert_eq!(unsupported.stage(), "rasterize");
        assert!(!unsupported.is_upstream());

        let misaligned = PipelineError::Misaligned {
            detail: "2 slides, 1 clip".to_string(),
        };
        assert_eq!(misaligned.stage(), "assemble");
    }
}
