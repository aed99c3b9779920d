// Thumbnail generation architecture
//
// - Prompt: the fixed channel style parameterized by title
// - Response: tagged view over the provider's response shapes
// - Placeholder: flat-color fallback and image normalization
// - Client: multimodal generation API implementation

pub mod client;
pub mod placeholder;
pub mod prompt;
pub mod response;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use client::HttpThumbnailGenerator;
pub use placeholder::{spawn_placeholder, write_placeholder};
pub use prompt::build_prompt;
pub use response::ImageResponse;

use crate::config::ThumbnailConfig;
use crate::error::Result;

/// A thumbnail on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub file_size: u64,
    /// True when the flat-color fallback was written instead of a generated image
    pub placeholder: bool,
}

/// Failures of the image generation API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageApiError {
    #[error("no image API key configured")]
    MissingKey,

    #[error("image API rejected the key: {0}")]
    InvalidKey(String),

    #[error("image API rate limit reached: {0}")]
    RateLimited(String),

    #[error("image model not found: {0}")]
    ModelNotFound(String),

    #[error("response carried no usable image: {0}")]
    NoImageData(String),

    #[error("image API error: {0}")]
    Other(String),
}

impl ImageApiError {
    /// Map an HTTP error response to an error kind
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail: String = body.chars().take(300).collect();
        match status {
            401 | 403 => Self::InvalidKey(detail),
            400 if body.contains("API_KEY_INVALID") || body.contains("API key not valid") => Self::InvalidKey(detail),
            404 => Self::ModelNotFound(detail),
            429 => Self::RateLimited(detail),
            _ => Self::Other(format!("status {}: {}", status, detail)),
        }
    }
}

/// Main trait for thumbnail generation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Generate a thumbnail for `title` styled after the reference image.
    ///
    /// Implementations degrade to a placeholder image instead of failing when
    /// the generation service is unavailable.
    async fn generate_thumbnail(
        &self,
        style_reference_path: &Path,
        title: &str,
        output_path: &Path,
    ) -> Result<ThumbnailImage>;
}

/// Factory for creating thumbnail generator instances
pub struct ThumbnailGeneratorFactory;

impl ThumbnailGeneratorFactory {
    pub fn create_generator(config: ThumbnailConfig) -> Result<Box<dyn ThumbnailGenerator>> {
        Ok(Box::new(HttpThumbnailGenerator::new(config)?))
    }
}
