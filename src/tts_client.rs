// Google Cloud Text-to-Speech client
// Supports: text:synthesize with a fixed voice and audio encoding

use crate::gemini_client::API_KEY_HEADER;
use crate::types::{BoxError, VoiceParams};
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct TextToSpeechClient {
    api_key: String,
    client: Client,
    base_url: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct SynthesizeSpeechRequest {
    pub input: SynthesisInput,
    pub voice: VoiceSelectionParams,
    #[serde(rename = "audioConfig")]
    pub audio_config: AudioConfig,
}

#[derive(Serialize, Debug)]
pub struct SynthesisInput {
    pub text: String,
}

#[derive(Serialize, Debug)]
pub struct VoiceSelectionParams {
    #[serde(rename = "languageCode")]
    pub language_code: String,
    #[serde(rename = "ssmlGender")]
    pub ssml_gender: String,
}

#[derive(Serialize, Debug)]
pub struct AudioConfig {
    #[serde(rename = "audioEncoding")]
    pub audio_encoding: String,
}

#[derive(Deserialize, Debug)]
pub struct SynthesizeSpeechResponse {
    #[serde(rename = "audioContent", default)]
    pub audio_content: String, // base64 encoded audio
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl SynthesizeSpeechRequest {
    pub fn new(text: &str, voice: &VoiceParams) -> Self {
        Self {
            input: SynthesisInput {
                text: text.to_string(),
            },
            voice: VoiceSelectionParams {
                language_code: voice.language_code.clone(),
                ssml_gender: voice.ssml_gender.clone(),
            },
            audio_config: AudioConfig {
                audio_encoding: voice.audio_encoding.clone(),
            },
        }
    }
}

impl SynthesizeSpeechResponse {
    pub fn decode_audio(&self) -> Result<Vec<u8>, BoxError> {
        if self.audio_content.is_empty() {
            return Err("Text-to-Speech response contained no audio".into());
        }
        let bytes = BASE64_STANDARD
            .decode(&self.audio_content)
            .map_err(|e| format!("Failed to decode audio content: {}", e))?;
        Ok(bytes)
    }
}

impl TextToSpeechClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://texttospeech.googleapis.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Synthesize `text` and return the encoded audio bytes.
    pub async fn synthesize_speech(
        &self,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<Vec<u8>, BoxError> {
        let url = format!("{}/text:synthesize", self.base_url);
        let request_body = SynthesizeSpeechRequest::new(text, voice);

        tracing::debug!(
            "🎵 Synthesizing {} chars with voice {}/{}",
            text.chars().count(),
            voice.language_code,
            voice.ssml_gender
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("Text-to-Speech API error ({}): {}", status, error_text).into());
        }

        let body: SynthesizeSpeechResponse = response.json().await.map_err(reqwest::Error::without_url)?;
        body.decode_audio()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = SynthesizeSpeechRequest::new("Hello.", &VoiceParams::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"]["text"], "Hello.");
        assert_eq!(json["voice"]["languageCode"], "en-US");
        assert_eq!(json["voice"]["ssmlGender"], "FEMALE");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
    }

    #[test]
    fn test_decode_audio() {
        let response: SynthesizeSpeechResponse =
            serde_json::from_str(r#"{"audioContent": "SUQz"}"#).unwrap();
        assert_eq!(response.decode_audio().unwrap(), b"ID3".to_vec());

        let empty: SynthesizeSpeechResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.decode_audio().is_err());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_reveal_api_key() {
        let client = TextToSpeechClient::new("TTS-SECRET".to_string()).with_base_url("http://127.0.0.1:1");

        let err = client
            .synthesize_speech("Hello.", &VoiceParams::default())
            .await
            .unwrap_err();

        assert!(!err.to_string().contains("TTS-SECRET"), "{}", err);
    }
}
