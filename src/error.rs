use thiserror::Error;

use crate::thumbnail::ImageApiError;
use crate::upload::UploadError;

#[derive(Error, Debug)]
pub enum ReelcastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Speech synthesis timed out after {attempts} status checks")]
    SpeechTimeout { attempts: u32 },

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Thumbnail generation error: {0}")]
    Thumbnail(#[from] ImageApiError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("Pipeline run rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, ReelcastError>;
