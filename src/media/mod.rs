// Media composition architecture
//
// This module wraps the external media tool (ffmpeg/ffprobe) behind a narrow trait:
// - Commands: command builders and the composition filter graph
// - Probe: ffprobe output parsing
// - Processor: ffmpeg-backed implementation with encoder selection

pub mod commands;
pub mod probe;
pub mod processor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use commands::*;
pub use probe::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// The encoded result of a composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputVideo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub file_size: u64,
    pub bitrate: u64,
    pub codec: String,
}

/// Main trait for media composition operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaComposer: Send + Sync {
    /// Compose background image, looped secondary video and audio into one video
    async fn compose(
        &self,
        banner_image_path: &Path,
        secondary_video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        duration_seconds: f64,
    ) -> Result<OutputVideo>;

    /// Read duration, dimensions and codecs of a media file
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Concatenate audio files in order into one file
    async fn concat_audio(&self, parts: &[PathBuf], output_path: &Path) -> Result<()>;

    /// Check if the media tools are available
    async fn check_availability(&self) -> Result<()>;

    /// Get media tool version information
    async fn get_version_info(&self) -> Result<String>;
}

/// Factory for creating media composer instances
pub struct MediaComposerFactory;

impl MediaComposerFactory {
    /// Create the default composer implementation (FFmpeg-based)
    pub fn create_composer(config: MediaConfig) -> Box<dyn MediaComposer> {
        Box::new(processor::FfmpegComposer::new(config))
    }
}
