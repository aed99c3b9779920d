use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, ReelcastError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechConfig,
    pub media: MediaConfig,
    pub thumbnail: ThumbnailConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Base URL of the asynchronous text-to-speech API
    pub base_url: String,
    /// Bearer API key (overridable with REELCAST_SPEECH_API_KEY)
    pub api_key: Option<String>,
    /// Synthesis model name
    pub model: String,
    /// Voice used when a run does not name one
    pub default_voice_id: String,
    /// Maximum characters per synthesis request
    pub chunk_limit: usize,
    /// Delay between status checks
    pub poll_interval_ms: u64,
    /// Status checks before giving up on a chunk
    pub max_poll_attempts: u32,
    /// How long a download URL stays valid after retrieval
    pub download_validity_secs: u64,
    /// Output audio container/codec (mp3, wav, flac)
    pub format: String,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub speed: f32,
    /// Request timeout for every TTS HTTP call
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Path to ffprobe binary
    pub probe_path: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Size of the region the secondary video is scaled into
    pub overlay_width: u32,
    pub overlay_height: u32,
    /// Force a specific encoder (e.g. "libx264", "h264_nvenc")
    pub video_encoder: Option<String>,
    /// Prefer a hardware encoder when the host exposes one
    pub hardware_acceleration: bool,
    pub audio_bitrate: String,
    /// Target length when the run does not set one
    pub default_duration_secs: f64,
    /// Without an explicit duration, match the narration length instead of the default
    pub match_narration_length: bool,
    /// Additional encoding options appended before the output path
    /// Common options: ["-preset", "medium", "-crf", "23"]
    pub extra_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Base URL of the multimodal generation API
    pub endpoint: String,
    /// API key (overridable with REELCAST_IMAGE_API_KEY)
    pub api_key: Option<String>,
    pub model: String,
    pub width: u32,
    pub height: u32,
    /// RGB fill of the fallback image
    pub placeholder_color: [u8; 3],
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Base URL for resumable uploads and thumbnail sets
    pub upload_base: String,
    /// Public watch URL prefix
    pub watch_url: String,
    /// OAuth token endpoint used for refresh
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// private, unlisted or public
    pub privacy_status: String,
    pub category_id: String,
    pub default_tags: Vec<String>,
    /// Footer appended to every generated description
    pub description_footer: String,
    pub request_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.minimax.io/v1".to_string(),
            api_key: None,
            model: "speech-02-hd".to_string(),
            default_voice_id: "female-shaonv".to_string(),
            chunk_limit: 2000,
            poll_interval_ms: 1000,
            max_poll_attempts: 60,
            download_validity_secs: 180,
            format: "mp3".to_string(),
            bitrate: 128_000,
            sample_rate: 32_000,
            channels: 1,
            speed: 1.0,
            request_timeout_secs: 60,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_path: "ffprobe".to_string(),
            width: 1920,
            height: 1080,
            fps: 30,
            overlay_width: 960,
            overlay_height: 540,
            video_encoder: None,
            hardware_acceleration: true,
            audio_bitrate: "192k".to_string(),
            default_duration_secs: 60.0,
            match_narration_length: false,
            extra_options: vec![
                // "-preset".to_string(), "medium".to_string(),
                // "-crf".to_string(), "23".to_string(),
            ],
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            model: "gemini-2.0-flash-preview-image-generation".to_string(),
            width: 1280,
            height: 720,
            placeholder_color: [0xE8, 0x6A, 0x33],
            request_timeout_secs: 120,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_base: "https://www.googleapis.com/upload/youtube/v3".to_string(),
            watch_url: "https://www.youtube.com/watch?v=".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
            privacy_status: "private".to_string(),
            category_id: "26".to_string(),
            default_tags: vec![
                "audiobook".to_string(),
                "cooking".to_string(),
                "story".to_string(),
            ],
            description_footer: "Narrated story while cooking. New episodes every week.".to_string(),
            request_timeout_secs: 600,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReelcastError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ReelcastError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReelcastError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ReelcastError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Override secrets from the process environment.
    ///
    /// Called once at startup; adapters only ever see the resulting struct.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("REELCAST_SPEECH_API_KEY") {
            debug!("Speech API key taken from environment");
            self.speech.api_key = Some(key);
        }
        if let Some(key) = get("REELCAST_IMAGE_API_KEY") {
            debug!("Image API key taken from environment");
            self.thumbnail.api_key = Some(key);
        }
        if let Some(id) = get("YOUTUBE_CLIENT_ID") {
            self.upload.client_id = Some(id);
        }
        if let Some(secret) = get("YOUTUBE_CLIENT_SECRET") {
            self.upload.client_secret = Some(secret);
        }
        if let Some(token) = get("YOUTUBE_REFRESH_TOKEN") {
            self.upload.refresh_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.speech.chunk_limit == 0 {
            return Err(ReelcastError::Config("speech.chunk_limit must be positive".to_string()));
        }
        if self.speech.max_poll_attempts == 0 {
            return Err(ReelcastError::Config("speech.max_poll_attempts must be positive".to_string()));
        }
        if self.media.width == 0 || self.media.height == 0 || self.media.fps == 0 {
            return Err(ReelcastError::Config("media output size and fps must be positive".to_string()));
        }
        if self.media.overlay_width > self.media.width || self.media.overlay_height > self.media.height {
            return Err(ReelcastError::Config(format!(
                "Overlay {}x{} does not fit into {}x{}",
                self.media.overlay_width, self.media.overlay_height, self.media.width, self.media.height
            )));
        }
        if self.thumbnail.width == 0 || self.thumbnail.height == 0 {
            return Err(ReelcastError::Config("thumbnail size must be positive".to_string()));
        }
        Ok(())
    }
}
