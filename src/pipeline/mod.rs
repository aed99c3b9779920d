// Pipeline architecture
//
// - Types: run configuration, per-step snapshots and the final result
// - Tracker: owns the step list and enforces monotonic status/progress
// - Orchestrator: sequences validation, voiceover, composition, thumbnail, upload
// - Events: runs a pipeline on a task and streams its progress over a channel

pub mod events;
pub mod orchestrator;
pub mod tracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub use events::{PipelineEvent, PipelineHandle, spawn_pipeline};
pub use orchestrator::{Pipeline, PipelineAdapters};
pub use tracker::StepTracker;

use crate::upload::UploadResult;

/// Everything one run needs; immutable for the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub story_text: String,
    pub story_title: String,
    pub banner_image_path: PathBuf,
    pub secondary_video_path: PathBuf,
    /// Voiceover location; derived from the output video when absent
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    pub avatar_image_path: PathBuf,
    pub output_video_path: PathBuf,
    pub output_thumbnail_path: PathBuf,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub upload_to_youtube: bool,
    #[serde(default)]
    pub youtube_access_token: Option<String>,
    #[serde(default)]
    pub resume_on_exist: bool,
    #[serde(default)]
    pub reuse_existing_thumbnail: bool,
}

impl PipelineConfig {
    /// Where the voiceover is written, `<video stem>_voiceover.<format>` by default
    pub fn voiceover_path(&self, format: &str) -> PathBuf {
        if let Some(path) = &self.audio_path {
            return path.clone();
        }

        let stem = self
            .output_video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let parent = self.output_video_path.parent().unwrap_or_else(|| Path::new(""));
        parent.join(format!("{}_voiceover.{}", stem, format))
    }

    /// Upload runs only when requested and a token was supplied
    pub fn upload_enabled(&self) -> bool {
        self.upload_to_youtube
            && self
                .youtube_access_token
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }
}

/// The fixed stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepKind {
    ValidateInput,
    GenerateVoiceover,
    ComposeVideo,
    GenerateThumbnail,
    Upload,
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        StepKind::ValidateInput,
        StepKind::GenerateVoiceover,
        StepKind::ComposeVideo,
        StepKind::GenerateThumbnail,
        StepKind::Upload,
    ];

    /// Display name shown to users
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::ValidateInput => "Validate Input",
            StepKind::GenerateVoiceover => "Generate Voiceover",
            StepKind::ComposeVideo => "Compose Video",
            StepKind::GenerateThumbnail => "Generate Thumbnail",
            StepKind::Upload => "Upload",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::InProgress => 1,
            StepStatus::Completed | StepStatus::Failed => 2,
        }
    }

    /// Statuses only move forward; terminal ones are frozen
    pub fn can_become(&self, next: StepStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

/// Snapshot of one stage of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineStep {
    pub fn new(kind: StepKind) -> Self {
        Self {
            name: kind.name().to_string(),
            kind,
            status: StepStatus::Pending,
            progress: 0,
            message: String::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub success: bool,
    pub voiceover_path: Option<PathBuf>,
    pub video_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub thumbnail_is_placeholder: bool,
    pub upload: Option<UploadResult>,
    pub error: Option<String>,
    /// One entry per attempted step, in order
    pub steps: Vec<PipelineStep>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn failed_step(&self) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Receives a snapshot of the current step after every state change
pub trait ProgressReporter: Send + Sync {
    fn report(&self, step: &PipelineStep);
}

impl<F> ProgressReporter for F
where
    F: Fn(&PipelineStep) + Send + Sync,
{
    fn report(&self, step: &PipelineStep) {
        self(step)
    }
}

impl ProgressReporter for UnboundedSender<PipelineEvent> {
    fn report(&self, step: &PipelineStep) {
        // A dropped receiver only means nobody is watching
        let _ = self.send(PipelineEvent::Progress(step.clone()));
    }
}
