use serde::Deserialize;

use crate::error::{Result, ReelcastError};

/// ffprobe `-show_format -show_streams` JSON output
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: Option<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
}

/// Normalized media properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub bitrate: Option<u64>,
    pub format_name: Option<String>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

fn parse_num<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|v| v.trim().parse::<T>().ok())
}

/// Parse ffprobe JSON into [`MediaInfo`]
pub fn parse_probe_output(json: &str) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ReelcastError::Media(format!("Unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    // Container duration first; stream durations are missing for some formats.
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| parse_num::<f64>(f.duration.as_ref()))
        .or_else(|| video.and_then(|s| parse_num::<f64>(s.duration.as_ref())))
        .or_else(|| audio.and_then(|s| parse_num::<f64>(s.duration.as_ref())))
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        video_codec: video.and_then(|s| s.codec_name.clone()),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        sample_rate: audio.and_then(|s| parse_num::<u32>(s.sample_rate.as_ref())),
        channels: audio.and_then(|s| s.channels),
        bitrate: probe
            .format
            .as_ref()
            .and_then(|f| parse_num::<u64>(f.bit_rate.as_ref())),
        format_name: probe.format.and_then(|f| f.format_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_and_audio_streams() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "duration": "12.000"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "44100", "channels": 2}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.040000", "size": "1048576", "bit_rate": "696000"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 12.04).abs() < 1e-9);
        assert_eq!(info.width, Some(1280));
        assert_eq!(info.height, Some(720));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.sample_rate, Some(44100));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.bitrate, Some(696000));
        assert!(info.has_video());
    }

    #[test]
    fn test_audio_only_falls_back_to_stream_duration() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "codec_name": "mp3", "sample_rate": "32000", "channels": 1, "duration": "3.5"}],
            "format": {"format_name": "mp3"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, 3.5);
        assert!(!info.has_video());
        assert_eq!(info.audio_codec.as_deref(), Some("mp3"));
    }

    #[test]
    fn test_garbage_is_media_error() {
        assert!(matches!(parse_probe_output("not json"), Err(ReelcastError::Media(_))));
    }
}
