use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, ReelcastError};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Only print errors
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy every stream unchanged
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Set a complex filter graph
    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Map a stream or filter label into the output
    pub fn map<S: Into<String>>(self, spec: S) -> Self {
        self.arg("-map").arg(spec)
    }

    /// Limit input or output duration (depends on position)
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }

    /// Execute the command, returning its stdout
    pub async fn execute(&self) -> Result<String> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ReelcastError::Media(format!(
                "Failed to execute {}: {}",
                self.binary_path, e
            )))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReelcastError::Media(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Inputs and output parameters for one composition run
#[derive(Debug, Clone)]
pub struct ComposeSpec<'a> {
    pub banner_image: &'a Path,
    pub secondary_video: &'a Path,
    pub audio: &'a Path,
    pub output: &'a Path,
    pub duration: f64,
    pub encoder: &'a str,
}

/// Builder for the commands the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
    probe_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, probe_path: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_path: probe_path.into(),
        }
    }

    /// Filter graph: background scaled and cropped to the frame, secondary
    /// video fitted into the overlay box and centered on top of it.
    pub fn compose_filter(
        width: u32,
        height: u32,
        overlay_width: u32,
        overlay_height: u32,
        fps: u32,
    ) -> String {
        format!(
            "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1[bg];\
             [1:v]scale={ow}:{oh}:force_original_aspect_ratio=decrease,\
             pad={ow}:{oh}:(ow-iw)/2:(oh-ih)/2,setsar=1[fg];\
             [bg][fg]overlay=(W-w)/2:(H-h)/2:shortest=1,fps={fps},format=yuv420p[v];\
             [2:a]apad[a]",
            w = width,
            h = height,
            ow = overlay_width,
            oh = overlay_height,
            fps = fps,
        )
    }

    /// Build the composition command
    pub fn compose(
        &self,
        spec: &ComposeSpec<'_>,
        filter: String,
        fps: u32,
        audio_bitrate: &str,
        additional_options: &[String],
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, "Video composition")
            .quiet()
            .overwrite()
            .args(["-loop", "1", "-framerate"])
            .arg(fps.to_string())
            .duration(spec.duration)
            .input(spec.banner_image)
            .args(["-stream_loop", "-1"])
            .duration(spec.duration)
            .input(spec.secondary_video)
            .input(spec.audio)
            .filter_complex(filter)
            .map("[v]")
            .map("[a]")
            .video_codec(spec.encoder)
            .audio_codec("aac")
            .arg("-b:a")
            .arg(audio_bitrate)
            .arg("-r")
            .arg(fps.to_string())
            .duration(spec.duration)
            .args(["-movflags", "+faststart"]);

        for option in additional_options {
            cmd = cmd.arg(option);
        }

        cmd.output(spec.output)
    }

    /// Build a stream-copy concatenation using the concat demuxer
    pub fn concat<P: AsRef<Path>>(&self, list_file: P, output_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio concatenation")
            .quiet()
            .overwrite()
            .args(["-f", "concat", "-safe", "0"])
            .input(list_file)
            .copy_streams()
            .output(output_path)
    }

    /// Build an ffprobe JSON query
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> MediaCommand {
        MediaCommand::new(&self.probe_path, "Media probe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .output(path)
    }

    /// Build the encoder listing command
    pub fn list_encoders(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Encoder listing")
            .arg("-hide_banner")
            .arg("-encoders")
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }

    /// Build probe version check command
    pub fn probe_version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.probe_path, "Probe version check").arg("-version")
    }
}

/// Body of a concat demuxer list file
pub fn concat_list<P: AsRef<Path>>(parts: &[P]) -> String {
    parts
        .iter()
        .map(|p| {
            let escaped = p.as_ref().to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_compose_command_layout() {
        let builder = MediaCommandBuilder::new("ffmpeg", "ffprobe");
        let spec = ComposeSpec {
            banner_image: Path::new("bg.png"),
            secondary_video: Path::new("cook.mp4"),
            audio: Path::new("voice.mp3"),
            output: Path::new("out.mp4"),
            duration: 42.5,
            encoder: "libx264",
        };
        let filter = MediaCommandBuilder::compose_filter(1920, 1080, 960, 540, 30);
        let cmd = builder.compose(&spec, filter, 30, "192k", &["-crf".to_string(), "23".to_string()]);

        let args = cmd.args.join(" ");
        assert!(args.contains("-loop 1 -framerate 30 -t 42.500 -i bg.png"));
        assert!(args.contains("-stream_loop -1 -t 42.500 -i cook.mp4"));
        assert!(args.contains("-i voice.mp3"));
        assert!(args.contains("-map [v] -map [a] -c:v libx264 -c:a aac"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(cmd.args[cmd.args.len() - 3], "-crf");
    }

    #[test]
    fn test_compose_filter_centers_overlay() {
        let filter = MediaCommandBuilder::compose_filter(1920, 1080, 960, 540, 30);
        assert!(filter.contains("crop=1920:1080"));
        assert!(filter.contains("scale=960:540"));
        assert!(filter.contains("overlay=(W-w)/2:(H-h)/2"));
        assert!(filter.contains("fps=30"));
        assert!(filter.contains("[2:a]apad[a]"));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let parts = vec![PathBuf::from("/tmp/a.mp3"), PathBuf::from("/tmp/it's.mp3")];
        assert_eq!(
            concat_list(&parts),
            "file '/tmp/a.mp3'\nfile '/tmp/it'\\''s.mp3'\n"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let cmd = MediaCommand::new("definitely-not-a-real-ffmpeg-binary", "Version check").arg("-version");
        let err = cmd.execute().await.unwrap_err();
        assert!(matches!(err, ReelcastError::Media(_)));
    }
}
