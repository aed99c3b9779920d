use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{ComposeSpec, MediaComposer, MediaCommandBuilder, MediaInfo, OutputVideo, concat_list, parse_probe_output};
use crate::config::MediaConfig;
use crate::error::{Result, ReelcastError};

const SOFTWARE_ENCODER: &str = "libx264";

/// Concrete implementation of media composer (FFmpeg-based)
pub struct FfmpegComposer {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegComposer {
    /// Create a new composer implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path, &config.probe_path);

        Self {
            config,
            command_builder,
        }
    }

    /// Pick the video encoder for this host.
    ///
    /// An explicit configuration wins; otherwise a hardware encoder is used when
    /// one is known to exist, and libx264 everywhere else.
    async fn select_encoder(&self) -> String {
        if let Some(encoder) = &self.config.video_encoder {
            return encoder.clone();
        }
        if !self.config.hardware_acceleration {
            return SOFTWARE_ENCODER.to_string();
        }
        if cfg!(target_os = "macos") {
            return "h264_videotoolbox".to_string();
        }

        match self.command_builder.list_encoders().execute().await {
            Ok(listing) => select_from_listing(&listing),
            Err(e) => {
                debug!("Could not list encoders, using software encoder: {}", e);
                SOFTWARE_ENCODER.to_string()
            }
        }
    }

    async fn run_compose(&self, spec: &ComposeSpec<'_>) -> Result<()> {
        let filter = MediaCommandBuilder::compose_filter(
            self.config.width,
            self.config.height,
            self.config.overlay_width,
            self.config.overlay_height,
            self.config.fps,
        );
        let command = self.command_builder.compose(
            spec,
            filter,
            self.config.fps,
            &self.config.audio_bitrate,
            &self.config.extra_options,
        );
        command.execute().await.map(|_| ())
    }
}

/// Choose a hardware H.264 encoder from `ffmpeg -encoders` output
pub fn select_from_listing(listing: &str) -> String {
    const HARDWARE: [&str; 3] = ["h264_nvenc", "h264_qsv", "h264_amf"];

    HARDWARE
        .iter()
        .find(|name| {
            listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(**name))
        })
        .map(|name| name.to_string())
        .unwrap_or_else(|| SOFTWARE_ENCODER.to_string())
}

#[async_trait]
impl MediaComposer for FfmpegComposer {
    async fn compose(
        &self,
        banner_image_path: &Path,
        secondary_video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        duration_seconds: f64,
    ) -> Result<OutputVideo> {
        if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
            return Err(ReelcastError::Media(format!(
                "Invalid target duration: {}",
                duration_seconds
            )));
        }

        // The secondary video is looped, so it must actually have frames.
        let secondary = self.probe(secondary_video_path).await?;
        if !secondary.has_video() || secondary.duration <= 0.0 {
            return Err(ReelcastError::Media(format!(
                "Secondary video has no playable video stream: {}",
                secondary_video_path.display()
            )));
        }
        info!(
            "Secondary video {}: {}x{}, {:.2}s",
            secondary_video_path.display(),
            secondary.width.unwrap_or(0),
            secondary.height.unwrap_or(0),
            secondary.duration
        );

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let encoder = self.select_encoder().await;
        info!(
            "Composing {} ({:.1}s, {}x{} @ {}fps, encoder {})",
            output_path.display(),
            duration_seconds,
            self.config.width,
            self.config.height,
            self.config.fps,
            encoder
        );

        let mut spec = ComposeSpec {
            banner_image: banner_image_path,
            secondary_video: secondary_video_path,
            audio: audio_path,
            output: output_path,
            duration: duration_seconds,
            encoder: &encoder,
        };

        let first_attempt = self.run_compose(&spec).await;
        if let Err(e) = first_attempt {
            if encoder == SOFTWARE_ENCODER {
                return Err(e);
            }
            warn!("Encoder {} failed, retrying with {}: {}", encoder, SOFTWARE_ENCODER, e);
            spec.encoder = SOFTWARE_ENCODER;
            self.run_compose(&spec).await?;
        }

        let file_size = fs::metadata(output_path).await?.len();
        let (width, height, duration, bitrate, codec) = match self.probe(output_path).await {
            Ok(info) => (
                info.width.unwrap_or(self.config.width),
                info.height.unwrap_or(self.config.height),
                info.duration,
                info.bitrate.unwrap_or_default(),
                info.video_codec.unwrap_or_else(|| "h264".to_string()),
            ),
            Err(e) => {
                warn!("Could not probe composed video, reporting configured values: {}", e);
                (self.config.width, self.config.height, duration_seconds, 0, "h264".to_string())
            }
        };

        info!("Video composition completed: {} ({} bytes)", output_path.display(), file_size);
        Ok(OutputVideo {
            path: output_path.to_path_buf(),
            width,
            height,
            duration,
            file_size,
            bitrate,
            codec,
        })
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let json = self.command_builder.probe(path).execute().await?;
        parse_probe_output(&json)
    }

    async fn concat_audio(&self, parts: &[PathBuf], output_path: &Path) -> Result<()> {
        match parts {
            [] => Err(ReelcastError::Media("No audio parts to concatenate".to_string())),
            [single] => {
                fs::copy(single, output_path).await?;
                Ok(())
            }
            _ => {
                info!("Concatenating {} audio parts into {}", parts.len(), output_path.display());
                let list_dir = tempfile::tempdir()?;
                let list_file = list_dir.path().join("parts.txt");
                fs::write(&list_file, concat_list(parts)).await?;

                self.command_builder
                    .concat(list_file.as_path(), output_path)
                    .execute()
                    .await?;
                Ok(())
            }
        }
    }

    async fn check_availability(&self) -> Result<()> {
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| ReelcastError::Media(format!("ffmpeg not available: {}", e)))?;
        self.command_builder
            .probe_version_check()
            .execute()
            .await
            .map_err(|e| ReelcastError::Media(format!("ffprobe not available: {}", e)))?;

        info!("Media tools are available");
        Ok(())
    }

    async fn get_version_info(&self) -> Result<String> {
        let output = self.command_builder.version_check().execute().await?;
        // The first line carries the version
        Ok(output.lines().next().unwrap_or("Unknown version").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 A....D aac                  AAC (Advanced Audio Coding)";

    #[test]
    fn test_select_hardware_encoder_from_listing() {
        assert_eq!(select_from_listing(LISTING), "h264_nvenc");
    }

    #[test]
    fn test_select_software_when_no_hardware_listed() {
        let listing = " V....D libx264              libx264 H.264";
        assert_eq!(select_from_listing(listing), "libx264");
    }

    #[tokio::test]
    async fn test_configured_encoder_wins() {
        let config = MediaConfig {
            video_encoder: Some("libx265".to_string()),
            ..MediaConfig::default()
        };
        let composer = FfmpegComposer::new(config);
        assert_eq!(composer.select_encoder().await, "libx265");
    }

    #[tokio::test]
    async fn test_rejects_non_positive_duration() {
        let composer = FfmpegComposer::new(MediaConfig::default());
        let p = Path::new("x");
        let err = composer.compose(p, p, p, p, 0.0).await.unwrap_err();
        assert!(matches!(err, ReelcastError::Media(_)));
    }

    #[tokio::test]
    async fn test_concat_single_part_copies() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("part.mp3");
        let out = dir.path().join("out.mp3");
        std::fs::write(&part, b"ID3audio").unwrap();

        let composer = FfmpegComposer::new(MediaConfig::default());
        composer.concat_audio(&[part], &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"ID3audio");
    }
}
