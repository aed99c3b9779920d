// Speech synthesis architecture
//
// - Chunk: sentence-aware splitting to the provider's request limit
// - Client: asynchronous submit/poll/download TTS API implementation
//
// Multi-chunk output is joined through the media composer, so the synthesizer
// is constructed with a handle to it.

pub mod chunk;
pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use chunk::{chunk_text, split_sentences};
pub use client::HttpSpeechSynthesizer;

use crate::config::SpeechConfig;
use crate::error::Result;
use crate::media::MediaComposer;

/// A narration file on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFile {
    pub path: PathBuf,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: String,
    pub file_size: u64,
}

/// Main trait for speech synthesis
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Narrate `text` with `voice_id` into `output_path`
    async fn synthesize(&self, text: &str, voice_id: &str, output_path: &Path) -> Result<AudioFile>;
}

/// Factory for creating speech synthesizer instances
pub struct SpeechSynthesizerFactory;

impl SpeechSynthesizerFactory {
    /// Create the HTTP-backed synthesizer
    pub fn create_synthesizer(
        config: SpeechConfig,
        media: Arc<dyn MediaComposer>,
    ) -> Result<Box<dyn SpeechSynthesizer>> {
        Ok(Box::new(HttpSpeechSynthesizer::new(config, media)?))
    }
}
