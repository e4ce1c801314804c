// config.rs - Environment driven application configuration
use crate::types::VoiceParams;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use thiserror::Error;

/// Accepted upload size, in MiB.
pub const UPLOAD_LIMIT_MB_RANGE: RangeInclusive<usize> = 1..=4096;
/// Accepted run retention, in hours (one year at most).
pub const RUN_RETENTION_HOURS_RANGE: RangeInclusive<i64> = 0..=8760;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub tts_api_key: Option<String>,
    pub voice: VoiceParams,
    pub firebase_api_key: Option<String>,
    pub firebase_project_id: Option<String>,
    pub require_auth: bool,
    pub work_dir: PathBuf,
    pub upload_limit_mb: usize,
    pub slide_concurrency: usize,
    pub render_width: u32,
    pub video_height: u32,
    pub pdfium_lib_dir: Option<PathBuf>,
    pub soffice_bin: String,
    pub run_retention_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let defaults = VoiceParams::default();
        let voice = VoiceParams {
            language_code: get("TTS_LANGUAGE_CODE").unwrap_or(defaults.language_code),
            ssml_gender: get("TTS_SSML_GENDER").unwrap_or(defaults.ssml_gender),
            audio_encoding: get("TTS_AUDIO_ENCODING").unwrap_or(defaults.audio_encoding),
        };

        Ok(Self {
            port: parse_or("PORT", get("PORT"), 5000)?,
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            tts_api_key: get("TTS_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            voice,
            firebase_api_key: get("FIREBASE_API_KEY"),
            firebase_project_id: get("FIREBASE_PROJECT_ID"),
            require_auth: parse_bool("REQUIRE_AUTH", get("REQUIRE_AUTH"))?,
            work_dir: get("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            upload_limit_mb: parse_in_range(
                "UPLOAD_LIMIT_MB",
                get("UPLOAD_LIMIT_MB"),
                100,
                UPLOAD_LIMIT_MB_RANGE,
            )?,
            slide_concurrency: parse_or("SLIDE_CONCURRENCY", get("SLIDE_CONCURRENCY"), 1usize)?.max(1),
            render_width: parse_or("RENDER_WIDTH", get("RENDER_WIDTH"), 1280)?,
            video_height: parse_or("VIDEO_HEIGHT", get("VIDEO_HEIGHT"), 720)?,
            pdfium_lib_dir: get("PDFIUM_LIB_DIR").map(PathBuf::from),
            soffice_bin: get("SOFFICE_BIN").unwrap_or_else(|| "soffice".to_string()),
            run_retention_hours: parse_in_range(
                "RUN_RETENTION_HOURS",
                get("RUN_RETENTION_HOURS"),
                24,
                RUN_RETENTION_HOURS_RANGE,
            )?,
        })
    }

    pub fn video_enabled(&self) -> bool {
        self.gemini_api_key.is_some() && self.tts_api_key.is_some()
    }

    pub fn upload_limit_bytes(&self) -> usize {
        self.upload_limit_mb * 1024 * 1024
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_in_range<T>(
    name: &'static str,
    value: Option<String>,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let parsed = parse_or(name, value, default)?;
    if range.contains(&parsed) {
        Ok(parsed)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: parsed.to_string(),
            reason: format!("expected {} to {}", range.start(), range.end()),
        })
    }
}

fn parse_bool(name: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            name,
            value: v,
            reason: "expected true or false".to_string(),
        }),
    }
}
