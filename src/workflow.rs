use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, ReelcastError};
use crate::media::{MediaComposer, MediaComposerFactory};
use crate::pipeline::{Pipeline, PipelineAdapters, PipelineConfig, PipelineHandle, spawn_pipeline};
use crate::speech::{SpeechSynthesizerFactory, chunk_text};
use crate::thumbnail::ThumbnailGeneratorFactory;
use crate::upload::UploaderFactory;

/// Availability of the external collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyReport {
    pub media_version: String,
    pub speech_key: bool,
    pub image_key: bool,
    pub upload_credentials: bool,
}

pub struct Workflow {
    config: Config,
    media: Arc<dyn MediaComposer>,
    pipeline: Arc<Pipeline>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let media: Arc<dyn MediaComposer> = Arc::from(MediaComposerFactory::create_composer(config.media.clone()));
        let speech = SpeechSynthesizerFactory::create_synthesizer(config.speech.clone(), Arc::clone(&media))?;
        let thumbnail = ThumbnailGeneratorFactory::create_generator(config.thumbnail.clone())?;
        let uploader = UploaderFactory::create_uploader(config.upload.clone())?;
        let token_refresher = UploaderFactory::create_refresher(config.upload.clone())?;

        let adapters = PipelineAdapters {
            speech: Arc::from(speech),
            media: Arc::clone(&media),
            thumbnail: Arc::from(thumbnail),
            uploader: Arc::from(uploader),
            token_refresher: Arc::from(token_refresher),
        };

        Ok(Self {
            pipeline: Arc::new(Pipeline::new(config.clone(), adapters)),
            config,
            media,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Verify the media tools and report which services are configured
    pub async fn check_dependencies(&self) -> Result<DependencyReport> {
        self.media.check_availability().await?;
        let media_version = self.media.get_version_info().await?;

        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let report = DependencyReport {
            media_version,
            speech_key: has(&self.config.speech.api_key),
            image_key: has(&self.config.thumbnail.api_key),
            upload_credentials: has(&self.config.upload.client_id)
                && has(&self.config.upload.client_secret)
                && has(&self.config.upload.refresh_token),
        };

        if !report.speech_key {
            warn!("No speech API key configured; voiceover generation will fail");
        }
        if !report.image_key {
            warn!("No image API key configured; thumbnails will be placeholders");
        }
        Ok(report)
    }

    /// Start a run in the background
    pub fn start(&self, job: PipelineConfig) -> PipelineHandle {
        info!("Starting job \"{}\"", job.story_title);
        spawn_pipeline(self.pipeline(), job)
    }

    /// Read a job description (the JSON form of `PipelineConfig`)
    pub fn load_job<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReelcastError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// How the story text would be split for synthesis
    pub fn chunk_preview(&self, text: &str, limit: Option<usize>) -> Vec<String> {
        chunk_text(text, limit.unwrap_or(self.config.speech.chunk_limit).max(1))
    }
}
