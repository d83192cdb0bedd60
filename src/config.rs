use std::path::PathBuf;
use std::time::Duration;

use crate::formats::VoiceGender;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Settings shared by the generation stages, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub text_model: String,
    pub tts_model: String,
    pub image_model: String,
    pub voice_female: String,
    pub voice_male: String,
    pub sample_rate: u32,
    pub ffmpeg_bin: String,
    pub font_path: Option<PathBuf>,
    pub http_timeout: Duration,
    pub webdriver_url: String,
}

impl Settings {
    /// Loads `.env` (if any) and reads `REELSMITH_*` variables.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_timeout_secs = get("REELSMITH_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);
        let sample_rate = get("REELSMITH_SAMPLE_RATE")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|rate| *rate > 0)
            .unwrap_or(24_000);

        Self {
            api_key: get("REELSMITH_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            api_base_url: get("REELSMITH_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned()),
            text_model: get("REELSMITH_TEXT_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash".to_owned()),
            tts_model: get("REELSMITH_TTS_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash-preview-tts".to_owned()),
            image_model: get("REELSMITH_IMAGE_MODEL")
                .unwrap_or_else(|| "gemini-2.0-flash-preview-image-generation".to_owned()),
            voice_female: get("REELSMITH_VOICE_FEMALE").unwrap_or_else(|| "Kore".to_owned()),
            voice_male: get("REELSMITH_VOICE_MALE").unwrap_or_else(|| "Charon".to_owned()),
            sample_rate,
            ffmpeg_bin: get("REELSMITH_FFMPEG").unwrap_or_else(|| "ffmpeg".to_owned()),
            font_path: get("REELSMITH_FONT").map(PathBuf::from),
            http_timeout: Duration::from_secs(http_timeout_secs),
            webdriver_url: get("REELSMITH_WEBDRIVER_URL")
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_owned()),
        }
    }

    pub fn voice_for(&self, gender: VoiceGender) -> &str {
        match gender {
            VoiceGender::Female => &self.voice_female,
            VoiceGender::Male => &self.voice_male,
        }
    }

    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("REELSMITH_API_KEY (or GEMINI_API_KEY) is not set"))
    }
}
