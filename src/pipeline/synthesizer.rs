//! Speech synthesis: narration text to an audio file plus its measured duration.
//!
//! The probed duration is the only timing signal the assembler gets; a slide
//! is on screen exactly as long as its narration plays.

use super::error::PipelineError;
use crate::media;
use crate::tts_client::TextToSpeechClient;
use crate::types::{AudioClip, BoxError, Narration, VoiceParams};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Return encoded audio for `text` using the fixed `voice` parameters.
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>, BoxError>;
}

#[async_trait]
impl SpeechService for TextToSpeechClient {
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>, BoxError> {
        self.synthesize_speech(text, voice).await
    }
}

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Playback duration of an audio file in seconds.
    async fn duration_secs(&self, audio: &Path) -> Result<f64, BoxError>;
}

/// Reads the container duration with ffprobe.
#[derive(Debug, Clone, Default)]
pub struct FfprobeDurationProbe;

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_secs(&self, audio: &Path) -> Result<f64, BoxError> {
        Ok(media::probe_duration(audio).await?)
    }
}

#[derive(Clone)]
pub struct SpeechSynthesizer {
    speech: Arc<dyn SpeechService>,
    probe: Arc<dyn DurationProbe>,
    voice: VoiceParams,
}

impl SpeechSynthesizer {
    pub fn new(speech: Arc<dyn SpeechService>, probe: Arc<dyn DurationProbe>, voice: VoiceParams) -> Self {
        Self { speech, probe, voice }
    }

    pub fn audio_path(&self, audio_dir: &Path, index: usize) -> PathBuf {
        audio_dir.join(format!("audio-{:03}.{}", index + 1, self.voice.file_extension()))
    }

    pub async fn synthesize(&self, narration: &Narration, audio_dir: &Path) -> Result<AudioClip, PipelineError> {
        let index = narration.index;

        let audio = self
            .speech
            .synthesize(&narration.text, &self.voice)
            .await
            .map_err(|e| PipelineError::SynthesisFailed {
                index,
                detail: e.to_string(),
            })?;

        if audio.is_empty() {
            return Err(PipelineError::SynthesisFailed {
                index,
                detail: "service returned no audio".to_string(),
            });
        }

        let path = self.audio_path(audio_dir, index);
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| PipelineError::workspace(&path, e))?;

        let duration_secs = self
            .probe
            .duration_secs(&path)
            .await
            .map_err(|e| PipelineError::DurationProbeFailed {
                index,
                detail: e.to_string(),
            })?;

        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(PipelineError::DurationProbeFailed {
                index,
                detail: format!("non-positive duration {}", duration_secs),
            });
        }

        tracing::info!(slide = index + 1, duration_secs, "Narration audio synthesized");
        Ok(AudioClip {
            index,
            path,
            duration_secs,
        })
    }
}
