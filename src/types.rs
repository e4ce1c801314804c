// types.rs - Data model shared by the pipeline, the clients and the handlers
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error type returned by the external service clients.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Document kinds the rasterizer knows how to turn into slide images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Ppt,
    Pptx,
}

impl DocumentFormat {
    /// Detect the format from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "ppt" => Some(Self::Ppt),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
        }
    }

    /// Office formats go through a PDF conversion before rasterization.
    pub fn needs_pdf_conversion(&self) -> bool {
        matches!(self, Self::Ppt | Self::Pptx)
    }
}

/// An uploaded deck, already written to the run's working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub original_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// One rasterized page. `index` is the 0-based page position and the only
/// correlation key with the narration and audio clip of the same slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideImage {
    pub index: usize,
    pub path: PathBuf,
}

impl SlideImage {
    pub fn mime_type(&self) -> &'static str {
        match self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "image/png",
        }
    }

    /// Human readable reference embedded in the narration prompt.
    pub fn reference(&self) -> String {
        let name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("slide");
        format!("slide {} ({})", self.index + 1, name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    pub index: usize,
    pub text: String,
}

/// Synthesized speech for one slide. `duration_secs` is probed from the
/// written file and decides how long the slide stays on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub index: usize,
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// The muxed output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub slide_count: usize,
    pub total_duration_secs: f64,
}

/// Fixed voice parameters sent with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub language_code: String,
    pub ssml_gender: String,
    pub audio_encoding: String,
}

impl VoiceParams {
    /// File extension matching the configured audio encoding.
    pub fn file_extension(&self) -> &'static str {
        match self.audio_encoding.to_uppercase().as_str() {
            "LINEAR16" => "wav",
            "OGG_OPUS" => "ogg",
            "MULAW" | "ALAW" => "wav",
            _ => "mp3",
        }
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            ssml_gender: "FEMALE".to_string(),
            audio_encoding: "MP3".to_string(),
        }
    }
}
