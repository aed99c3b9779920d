use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{Result, ReelcastError};
use crate::pipeline::PipelineConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of progress bars
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Produce one episode: voiceover, video, thumbnail and optional upload
    Run(RunArgs),

    /// Run a job described by a JSON file
    RunJob {
        /// Job file (a serialized pipeline configuration)
        file: PathBuf,
    },

    /// Check that ffmpeg/ffprobe are installed and which services are configured
    Check,

    /// Write a configuration file with default values
    InitConfig {
        /// Destination path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show how a story would be split for speech synthesis
    Chunk {
        /// Story text file
        file: PathBuf,

        /// Chunk size in characters (defaults to the configured limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Story text
    #[arg(long, conflicts_with = "story_file")]
    pub story_text: Option<String>,

    /// Read the story text from a file
    #[arg(long)]
    pub story_file: Option<PathBuf>,

    /// Story title, used for the thumbnail and upload metadata
    #[arg(short, long)]
    pub title: String,

    /// Background image
    #[arg(long)]
    pub banner: PathBuf,

    /// Secondary video looped over the background
    #[arg(long)]
    pub secondary_video: PathBuf,

    /// Style reference image for the thumbnail
    #[arg(long)]
    pub avatar: PathBuf,

    /// Output video file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output thumbnail file
    #[arg(long)]
    pub thumbnail: PathBuf,

    /// Voiceover file (defaults to <output stem>_voiceover.<format>)
    #[arg(long)]
    pub audio: Option<PathBuf>,

    /// Voice identifier for the speech provider
    #[arg(long)]
    pub voice_id: Option<String>,

    /// Video duration in seconds (defaults to media.default_duration_secs, 60)
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Upload the result to YouTube
    #[arg(long)]
    pub upload: bool,

    /// OAuth access token for the upload
    #[arg(long)]
    pub access_token: Option<String>,

    /// Skip steps whose output already exists
    #[arg(long)]
    pub resume: bool,

    /// Keep an existing thumbnail instead of generating a new one
    #[arg(long)]
    pub reuse_thumbnail: bool,
}

impl RunArgs {
    pub fn into_config(self) -> Result<PipelineConfig> {
        let story_text = match (self.story_text, &self.story_file) {
            (Some(text), _) => text,
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(|e| ReelcastError::FileNotFound(format!("story file {}: {}", path.display(), e)))?,
            (None, None) => {
                return Err(ReelcastError::Validation(
                    "either --story-text or --story-file is required".to_string(),
                ));
            }
        };

        Ok(PipelineConfig {
            story_text,
            story_title: self.title,
            banner_image_path: self.banner,
            secondary_video_path: self.secondary_video,
            audio_path: self.audio,
            avatar_image_path: self.avatar,
            output_video_path: self.output,
            output_thumbnail_path: self.thumbnail,
            voice_id: self.voice_id,
            video_duration: self.duration,
            upload_to_youtube: self.upload,
            youtube_access_token: self.access_token,
            resume_on_exist: self.resume,
            reuse_existing_thumbnail: self.reuse_thumbnail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    const BASE: [&str; 12] = [
        "reelcast",
        "run",
        "--title",
        "Tale",
        "--banner",
        "b.png",
        "--secondary-video",
        "v.mp4",
        "--avatar",
        "a.png",
        "--output",
        "o.mp4",
    ];

    fn parse_run(extra: &[&str]) -> RunArgs {
        let argv: Vec<&str> = BASE.iter().copied().chain(["--thumbnail", "t.png"]).chain(extra.iter().copied()).collect();
        match Args::try_parse_from(argv).unwrap().command {
            Commands::Run(run) => run,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_flags_map_to_config() {
        let run = parse_run(&["--story-text", "Xin chào.", "--duration", "30", "--upload", "--access-token", "tok"]);
        let config = run.into_config().unwrap();

        assert_eq!(config.story_text, "Xin chào.");
        assert_eq!(config.video_duration, Some(30.0));
        assert!(config.upload_enabled());
        assert!(!config.resume_on_exist);
    }

    #[test]
    fn test_story_file_is_read() {
        let temp = TempDir::new().unwrap();
        let story = temp.child("story.txt");
        story.write_str("Ngày xưa...").unwrap();

        let path = story.path().to_string_lossy().into_owned();
        let config = parse_run(&["--story-file", &path, "--resume"]).into_config().unwrap();

        assert_eq!(config.story_text, "Ngày xưa...");
        assert!(config.resume_on_exist);
    }

    #[test]
    fn test_story_is_required() {
        let err = parse_run(&[]).into_config().unwrap_err();
        assert!(matches!(err, ReelcastError::Validation(_)));
    }

    #[test]
    fn test_story_sources_conflict() {
        let argv: Vec<&str> = BASE
            .iter()
            .copied()
            .chain(["--thumbnail", "t.png", "--story-text", "x", "--story-file", "s.txt"])
            .collect();
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["reelcast", "check", "--json", "-v"]).unwrap();
        assert!(args.json && args.verbose);
        assert!(matches!(args.command, Commands::Check));
    }
}
