use crate::types::BoxError;
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Google APIs accept the key as a header, which keeps it out of URLs and
/// therefore out of transport error messages.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    // Parts this service never produces (function calls, thoughts) are kept opaque.
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String, // base64 encoded data
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "topK")]
    pub top_k: u32,
    #[serde(rename = "topP")]
    pub top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(rename = "promptFeedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
    pub index: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason")]
    pub block_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    pub total_token_count: u32,
}

/// An image sent alongside a prompt.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, `None` when it carries no text.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<&str>>()
            .join("");

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BoxError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        tracing::debug!(
            model = %self.model,
            parts = request.contents.iter().map(|c| c.parts.len()).sum::<usize>(),
            "Gemini generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if response.status().is_success() {
            let response_text = response.text().await.map_err(reqwest::Error::without_url)?;
            tracing::debug!(
                "Gemini API response (truncated): {}...",
                truncate(&response_text, 500)
            );

            match serde_json::from_str::<GenerateContentResponse>(&response_text) {
                Ok(result) => {
                    if let Some(usage) = &result.usage_metadata {
                        tracing::debug!(
                            prompt_tokens = usage.prompt_token_count,
                            output_tokens = usage.candidates_token_count,
                            "Gemini token usage"
                        );
                    }
                    Ok(result)
                }
                Err(parse_error) => {
                    tracing::error!("Failed to parse Gemini response: {}", parse_error);
                    Err(format!("error decoding response body: {}", parse_error).into())
                }
            }
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            Err(format!("Gemini API error ({}): {}", status, error_text).into())
        }
    }

    /// Single-turn prompt, optionally with images, returning the response text.
    pub async fn generate_text(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<String, BoxError> {
        let request = build_request(prompt, images);
        let response = self.generate_content(request).await?;

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_ref())
        {
            return Err(format!("Prompt blocked by Gemini: {}", reason).into());
        }

        response
            .text()
            .ok_or_else(|| "Gemini returned no text".into())
    }
}

pub fn build_request(prompt: &str, images: &[ImageAttachment]) -> GenerateContentRequest {
    let mut parts = vec![Part::Text {
        text: prompt.to_string(),
    }];
    parts.extend(images.iter().map(|image| Part::InlineData {
        inline_data: InlineData {
            mime_type: image.mime_type.clone(),
            data: BASE64_STANDARD.encode(&image.bytes),
        },
    }));

    GenerateContentRequest {
        contents: vec![Content {
            parts,
            role: Some("user".to_string()),
        }],
        generation_config: None,
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
