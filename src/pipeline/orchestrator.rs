use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::{PipelineConfig, PipelineResult, ProgressReporter, StepKind, StepTracker};
use crate::config::Config;
use crate::error::{Result, ReelcastError};
use crate::media::MediaComposer;
use crate::speech::SpeechSynthesizer;
use crate::thumbnail::{ThumbnailGenerator, spawn_placeholder};
use crate::upload::{TokenRefresher, UploadMetadata, UploadResult, Uploader};

const SKIPPED: &str = "skipped, already exists";

/// The external collaborators a pipeline drives
pub struct PipelineAdapters {
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub media: Arc<dyn MediaComposer>,
    pub thumbnail: Arc<dyn ThumbnailGenerator>,
    pub uploader: Arc<dyn Uploader>,
    pub token_refresher: Arc<dyn TokenRefresher>,
}

/// Outputs recorded as steps complete
#[derive(Default)]
struct RunOutputs {
    voiceover_path: Option<PathBuf>,
    voiceover_duration: Option<f64>,
    video_path: Option<PathBuf>,
    thumbnail_path: Option<PathBuf>,
    thumbnail_is_placeholder: bool,
    upload: Option<UploadResult>,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ReelcastError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Target length of the composed video.
///
/// An explicit duration wins. `voiceover` is only passed when the composer is
/// configured to match the narration length; otherwise the default applies.
pub fn resolve_duration(explicit: Option<f64>, voiceover: Option<f64>, default_secs: f64) -> f64 {
    explicit
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| voiceover.filter(|d| d.is_finite() && *d > 0.0))
        .unwrap_or(default_secs)
}

/// Sequences one content run: validate, narrate, compose, thumbnail, upload
pub struct Pipeline {
    config: Config,
    adapters: PipelineAdapters,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Config, adapters: PipelineAdapters) -> Self {
        Self {
            config,
            adapters,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Token checked between steps; cancelling stops this and later runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run every step in order.
    ///
    /// Step failures end up in the returned result; `Err` means the run never
    /// started because another one is in flight.
    pub async fn execute(&self, config: &PipelineConfig, reporter: &dyn ProgressReporter) -> Result<PipelineResult> {
        let _guard = RunGuard::acquire(&self.running)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting pipeline run {} for \"{}\"", run_id, config.story_title);

        let mut tracker = StepTracker::new(reporter);
        let mut outputs = RunOutputs::default();
        let outcome = self.run_steps(config, &mut tracker, &mut outputs).await;

        let result = PipelineResult {
            run_id,
            success: outcome.is_ok(),
            voiceover_path: outputs.voiceover_path,
            video_path: outputs.video_path,
            thumbnail_path: outputs.thumbnail_path,
            thumbnail_is_placeholder: outputs.thumbnail_is_placeholder,
            upload: outputs.upload,
            error: outcome.err(),
            steps: tracker.into_steps(),
            started_at,
            finished_at: Utc::now(),
        };

        match &result.error {
            None => info!("Pipeline run {} finished in {:.1}s", run_id, result.elapsed_secs()),
            Some(e) => warn!("Pipeline run {} failed: {}", run_id, e),
        }
        Ok(result)
    }

    async fn run_steps(
        &self,
        config: &PipelineConfig,
        tracker: &mut StepTracker<'_>,
        outputs: &mut RunOutputs,
    ) -> std::result::Result<(), String> {
        for kind in StepKind::ALL {
            // A step that will not run cannot be cancelled
            if kind == StepKind::Upload && !config.upload_enabled() {
                if config.upload_to_youtube {
                    info!("Upload requested without an access token, skipping");
                }
                continue;
            }

            if self.cancel.is_cancelled() {
                warn!("Pipeline cancelled before {}", kind);
                return Err(format!("Pipeline cancelled before {}", kind));
            }

            tracker.begin(kind, format!("Starting {}", kind.name().to_lowercase()));
            let step = match kind {
                StepKind::ValidateInput => self.validate_input(config, tracker),
                StepKind::GenerateVoiceover => self.generate_voiceover(config, tracker, outputs).await,
                StepKind::ComposeVideo => self.compose_video(config, tracker, outputs).await,
                StepKind::GenerateThumbnail => self.generate_thumbnail(config, tracker, outputs).await,
                StepKind::Upload => self.upload(config, tracker, outputs).await,
            };

            match step {
                Ok(message) => tracker.complete(message),
                Err(e) => {
                    let message = e.to_string();
                    tracker.fail(message.clone());
                    return Err(message);
                }
            }
        }

        Ok(())
    }

    fn validate_input(&self, config: &PipelineConfig, tracker: &mut StepTracker<'_>) -> Result<String> {
        if config.story_text.trim().is_empty() {
            return Err(ReelcastError::Validation("story text is empty".to_string()));
        }
        tracker.advance(20, "Story text present");

        if config.story_title.trim().is_empty() {
            return Err(ReelcastError::Validation("story title is empty".to_string()));
        }
        tracker.advance(40, "Story title present");

        let files = [
            ("banner image", &config.banner_image_path),
            ("secondary video", &config.secondary_video_path),
            ("avatar image", &config.avatar_image_path),
        ];
        for (i, (label, path)) in files.iter().enumerate() {
            if !path.is_file() {
                return Err(ReelcastError::FileNotFound(format!("{} {}", label, path.display())));
            }
            tracker.advance(60 + 20 * i as u8, format!("Found {}", label));
        }

        Ok("Input is valid".to_string())
    }

    async fn generate_voiceover(
        &self,
        config: &PipelineConfig,
        tracker: &mut StepTracker<'_>,
        outputs: &mut RunOutputs,
    ) -> Result<String> {
        let audio_path = config.voiceover_path(&self.config.speech.format);

        if config.resume_on_exist && audio_path.exists() {
            outputs.voiceover_path = Some(audio_path);
            return Ok(SKIPPED.to_string());
        }

        ensure_parent(&audio_path).await?;
        let voice_id = config
            .voice_id
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.config.speech.default_voice_id);
        tracker.advance(10, format!("Synthesizing {} characters", config.story_text.chars().count()));

        let audio = self
            .adapters
            .speech
            .synthesize(&config.story_text, voice_id, &audio_path)
            .await?;

        let message = format!("Voiceover ready ({:.1}s)", audio.duration);
        outputs.voiceover_duration = Some(audio.duration);
        outputs.voiceover_path = Some(audio.path);
        Ok(message)
    }

    async fn compose_video(
        &self,
        config: &PipelineConfig,
        tracker: &mut StepTracker<'_>,
        outputs: &mut RunOutputs,
    ) -> Result<String> {
        let output = &config.output_video_path;

        if config.resume_on_exist && output.exists() {
            outputs.video_path = Some(output.clone());
            return Ok(SKIPPED.to_string());
        }

        let audio_path = outputs
            .voiceover_path
            .clone()
            .unwrap_or_else(|| config.voiceover_path(&self.config.speech.format));

        let narration = match (config.video_duration, outputs.voiceover_duration) {
            (Some(_), _) => None,
            _ if !self.config.media.match_narration_length => None,
            (None, None) => self.probe_duration(&audio_path).await,
            (None, known) => known,
        };
        let duration = resolve_duration(config.video_duration, narration, self.config.media.default_duration_secs);
        tracker.advance(10, format!("Encoding {:.1}s video", duration));

        let video = self
            .adapters
            .media
            .compose(
                &config.banner_image_path,
                &config.secondary_video_path,
                &audio_path,
                output,
                duration,
            )
            .await?;

        outputs.video_path = Some(video.path.clone());
        Ok(format!(
            "Video composed ({}x{}, {:.1}s, {})",
            video.width, video.height, video.duration, video.codec
        ))
    }

    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        match self.adapters.media.probe(path).await {
            Ok(info) => Some(info.duration),
            Err(e) => {
                warn!("Could not read narration length from {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn generate_thumbnail(
        &self,
        config: &PipelineConfig,
        tracker: &mut StepTracker<'_>,
        outputs: &mut RunOutputs,
    ) -> Result<String> {
        let output = &config.output_thumbnail_path;

        if (config.reuse_existing_thumbnail || config.resume_on_exist) && output.exists() {
            outputs.thumbnail_path = Some(output.clone());
            return Ok(SKIPPED.to_string());
        }

        tracker.advance(10, "Requesting thumbnail");
        let generated = self
            .adapters
            .thumbnail
            .generate_thumbnail(&config.avatar_image_path, &config.story_title, output)
            .await;

        let thumbnail = match generated {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                warn!("Thumbnail generation failed, writing placeholder: {}", e);
                tracker.advance(80, "Writing placeholder thumbnail");
                let settings = &self.config.thumbnail;
                spawn_placeholder(output, settings.width, settings.height, settings.placeholder_color).await?
            }
        };

        outputs.thumbnail_is_placeholder = thumbnail.placeholder;
        outputs.thumbnail_path = Some(thumbnail.path);
        Ok(if thumbnail.placeholder {
            "Placeholder thumbnail written".to_string()
        } else {
            format!("Thumbnail generated ({}x{})", thumbnail.width, thumbnail.height)
        })
    }

    async fn upload(
        &self,
        config: &PipelineConfig,
        tracker: &mut StepTracker<'_>,
        outputs: &mut RunOutputs,
    ) -> Result<String> {
        let supplied = config.youtube_access_token.as_deref().unwrap_or_default();

        tracker.advance(10, "Refreshing access token");
        let token = self.adapters.token_refresher.refresh(supplied).await?;

        let video_path = outputs
            .video_path
            .clone()
            .unwrap_or_else(|| config.output_video_path.clone());
        let thumbnail_path = outputs
            .thumbnail_path
            .clone()
            .unwrap_or_else(|| config.output_thumbnail_path.clone());
        let metadata = UploadMetadata::from_story(&config.story_title, &config.story_text, &self.config.upload);

        tracker.advance(30, "Uploading video");
        let uploaded = self
            .adapters
            .uploader
            .upload(&video_path, &thumbnail_path, &metadata, &token)
            .await?;

        let message = format!("Uploaded to {}", uploaded.url);
        outputs.upload = Some(uploaded);
        Ok(message)
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
