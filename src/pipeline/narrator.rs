//! Narration generation: one generative-text request per slide.

use super::error::PipelineError;
use crate::gemini_client::{GeminiClient, ImageAttachment};
use crate::types::{BoxError, Narration, SlideImage};
use async_trait::async_trait;
use std::sync::Arc;

/// Stateless single-turn text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, images: &[ImageAttachment]) -> Result<String, BoxError>;
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, images: &[ImageAttachment]) -> Result<String, BoxError> {
        self.generate_text(prompt, images).await
    }
}

pub fn narration_prompt(slide: &SlideImage) -> String {
    format!(
        "Generate a brief, professional explanation for the following slide image content: \"{}\"",
        slide.reference()
    )
}

#[derive(Clone)]
pub struct NarrationGenerator {
    text: Arc<dyn TextGenerator>,
}

impl NarrationGenerator {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    pub async fn narrate(&self, slide: &SlideImage) -> Result<Narration, PipelineError> {
        let bytes = tokio::fs::read(&slide.path)
            .await
            .map_err(|e| PipelineError::workspace(&slide.path, e))?;
        let attachment = ImageAttachment {
            mime_type: slide.mime_type().to_string(),
            bytes,
        };

        let response = self
            .text
            .generate(&narration_prompt(slide), std::slice::from_ref(&attachment))
            .await
            .map_err(|e| PipelineError::GenerationFailed {
                index: slide.index,
                detail: e.to_string(),
            })?;

        let text = response.trim();
        if text.is_empty() {
            return Err(PipelineError::GenerationFailed {
                index: slide.index,
                detail: "service returned no text".to_string(),
            });
        }

        tracing::info!(slide = slide.index + 1, chars = text.len(), "Narration generated");
        Ok(Narration {
            index: slide.index,
            text: text.to_string(),
        })
    }
}
