use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{AudioFile, SpeechSynthesizer, chunk_text};
use crate::config::SpeechConfig;
use crate::error::{Result, ReelcastError};
use crate::media::MediaComposer;

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    model: &'a str,
    text: &'a str,
    voice_setting: VoiceSetting<'a>,
    audio_setting: AudioSetting<'a>,
}

#[derive(Debug, Serialize)]
struct VoiceSetting<'a> {
    voice_id: &'a str,
    speed: f32,
}

#[derive(Debug, Serialize)]
struct AudioSetting<'a> {
    audio_sample_rate: u32,
    bitrate: u32,
    format: &'a str,
    channel: u32,
}

/// Provider envelope carried by every response
#[derive(Debug, Deserialize)]
struct BaseResp {
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: Option<Value>,
    base_resp: Option<BaseResp>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    status: String,
    file_id: Option<Value>,
    base_resp: Option<BaseResp>,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    file: Option<RetrievedFile>,
    base_resp: Option<BaseResp>,
}

#[derive(Debug, Deserialize)]
struct RetrievedFile {
    download_url: String,
}

/// Task state reported by the status endpoint
#[derive(Debug, Clone, PartialEq)]
enum TaskStatus {
    Processing,
    Success(String),
    Failed(String),
}

/// Ids come back as numbers or strings depending on the endpoint version
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn check_base_resp(base_resp: Option<&BaseResp>, what: &str) -> Result<()> {
    match base_resp {
        Some(resp) if resp.status_code != 0 => Err(ReelcastError::Speech(format!(
            "{} rejected by provider ({}): {}",
            what, resp.status_code, resp.status_msg
        ))),
        _ => Ok(()),
    }
}

/// Asynchronous TTS client: submit, poll, retrieve, download
pub struct HttpSpeechSynthesizer {
    client: Client,
    config: SpeechConfig,
    media: Arc<dyn MediaComposer>,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: SpeechConfig, media: Arc<dyn MediaComposer>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, config, media })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ReelcastError::Speech(
                "No speech API key configured (set speech.api_key or REELCAST_SPEECH_API_KEY)".to_string(),
            ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ReelcastError::Speech(format!("{} failed with status {}: {}", what, status, body)))
    }

    /// Submit one chunk, returning the provider task id
    async fn submit(&self, text: &str, voice_id: &str) -> Result<String> {
        let request = SubmitRequest {
            model: &self.config.model,
            text,
            voice_setting: VoiceSetting {
                voice_id,
                speed: self.config.speed,
            },
            audio_setting: AudioSetting {
                audio_sample_rate: self.config.sample_rate,
                bitrate: self.config.bitrate,
                format: &self.config.format,
                channel: self.config.channels,
            },
        };

        let response = self
            .client
            .post(self.url("t2a_async"))
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await?;
        let parsed: SubmitResponse = Self::check_status(response, "Speech submission").await?.json().await?;

        check_base_resp(parsed.base_resp.as_ref(), "Speech submission")?;
        parsed
            .task_id
            .as_ref()
            .and_then(id_to_string)
            .ok_or_else(|| ReelcastError::Speech("Speech submission returned no task id".to_string()))
    }

    async fn query(&self, task_id: &str) -> Result<TaskStatus> {
        let response = self
            .client
            .get(self.url("query/t2a_async"))
            .bearer_auth(self.api_key()?)
            .query(&[("task_id", task_id)])
            .send()
            .await?;
        let parsed: QueryResponse = Self::check_status(response, "Speech status query").await?.json().await?;

        check_base_resp(parsed.base_resp.as_ref(), "Speech status query")?;
        match parsed.status.to_ascii_lowercase().as_str() {
            "success" => parsed
                .file_id
                .as_ref()
                .and_then(id_to_string)
                .map(TaskStatus::Success)
                .ok_or_else(|| ReelcastError::Speech("Speech task succeeded without a file id".to_string())),
            "failed" | "expired" => Ok(TaskStatus::Failed(parsed.status)),
            _ => Ok(TaskStatus::Processing),
        }
    }

    /// Poll at a fixed interval until the task reaches a terminal state
    async fn wait_for_completion(&self, task_id: &str) -> Result<String> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        for attempt in 1..=self.config.max_poll_attempts {
            match self.query(task_id).await? {
                TaskStatus::Success(file_id) => {
                    debug!("Task {} finished after {} checks", task_id, attempt);
                    return Ok(file_id);
                }
                TaskStatus::Failed(status) => {
                    return Err(ReelcastError::Speech(format!(
                        "Speech task {} ended with status {}",
                        task_id, status
                    )));
                }
                TaskStatus::Processing => {
                    if attempt < self.config.max_poll_attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        Err(ReelcastError::SpeechTimeout {
            attempts: self.config.max_poll_attempts,
        })
    }

    async fn retrieve(&self, file_id: &str) -> Result<(String, Instant)> {
        let response = self
            .client
            .get(self.url("files/retrieve"))
            .bearer_auth(self.api_key()?)
            .query(&[("file_id", file_id)])
            .send()
            .await?;
        let parsed: RetrieveResponse = Self::check_status(response, "Audio retrieval").await?.json().await?;

        check_base_resp(parsed.base_resp.as_ref(), "Audio retrieval")?;
        let file = parsed
            .file
            .ok_or_else(|| ReelcastError::Speech("Audio retrieval returned no file".to_string()))?;
        Ok((file.download_url, Instant::now()))
    }

    async fn download(&self, url: &str) -> Result<std::result::Result<Vec<u8>, StatusCode>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if matches!(status, StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(Err(status));
        }
        let response = Self::check_status(response, "Audio download").await?;
        Ok(Ok(response.bytes().await?.to_vec()))
    }

    /// Fetch the finished audio before its link expires, re-retrieving the link once
    async fn fetch_audio(&self, file_id: &str) -> Result<Vec<u8>> {
        let validity = Duration::from_secs(self.config.download_validity_secs);
        let (mut url, mut retrieved_at) = self.retrieve(file_id).await?;

        for attempt in 0..2 {
            if retrieved_at.elapsed() >= validity {
                warn!("Download link for {} expired before use, retrieving a new one", file_id);
                (url, retrieved_at) = self.retrieve(file_id).await?;
            }

            match self.download(&url).await? {
                Ok(bytes) => return Ok(bytes),
                Err(status) if attempt == 0 => {
                    warn!("Download link for {} rejected ({}), retrieving a new one", file_id, status);
                    (url, retrieved_at) = self.retrieve(file_id).await?;
                }
                Err(status) => {
                    return Err(ReelcastError::Speech(format!(
                        "Audio download for {} failed with status {}",
                        file_id, status
                    )));
                }
            }
        }

        Err(ReelcastError::Speech(format!("Audio download for {} failed", file_id)))
    }

    async fn synthesize_chunk(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let task_id = self.submit(text, voice_id).await?;
        debug!("Submitted speech task {} ({} chars)", task_id, text.chars().count());

        let file_id = self.wait_for_completion(&task_id).await?;
        let audio = self.fetch_audio(&file_id).await?;
        if audio.is_empty() {
            return Err(ReelcastError::Speech(format!("Speech task {} produced empty audio", task_id)));
        }
        Ok(audio)
    }

    /// Probe the written file; fall back to configured values when probing fails
    async fn describe(&self, path: &Path) -> Result<AudioFile> {
        let file_size = fs::metadata(path).await?.len();

        let (duration, sample_rate, channels) = match self.media.probe(path).await {
            Ok(info) => (
                info.duration,
                info.sample_rate.unwrap_or(self.config.sample_rate),
                info.channels.unwrap_or(self.config.channels),
            ),
            Err(e) => {
                warn!("Could not probe {}, estimating duration from bitrate: {}", path.display(), e);
                let estimate = if self.config.bitrate > 0 {
                    file_size as f64 * 8.0 / self.config.bitrate as f64
                } else {
                    0.0
                };
                (estimate, self.config.sample_rate, self.config.channels)
            }
        };

        Ok(AudioFile {
            path: path.to_path_buf(),
            duration,
            sample_rate,
            channels,
            format: self.config.format.clone(),
            file_size,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str, output_path: &Path) -> Result<AudioFile> {
        self.api_key()?;

        let chunks = chunk_text(text, self.config.chunk_limit);
        if chunks.is_empty() {
            return Err(ReelcastError::Speech("Nothing to synthesize: text is empty".to_string()));
        }
        info!(
            "Synthesizing {} chars in {} chunk(s) with voice {}",
            text.chars().count(),
            chunks.len(),
            voice_id
        );

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        if chunks.len() == 1 {
            let audio = self.synthesize_chunk(&chunks[0], voice_id).await?;
            fs::write(output_path, audio).await?;
        } else {
            let work_dir = tempfile::tempdir()?;
            let mut parts: Vec<PathBuf> = Vec::with_capacity(chunks.len());

            for (index, chunk) in chunks.iter().enumerate() {
                info!("Synthesizing chunk {}/{}", index + 1, chunks.len());
                let audio = self.synthesize_chunk(chunk, voice_id).await?;
                let part = work_dir
                    .path()
                    .join(format!("part_{:03}.{}", index, self.config.format));
                fs::write(&part, audio).await?;
                parts.push(part);
            }

            self.media.concat_audio(&parts, output_path).await?;
        }

        let audio = self.describe(output_path).await?;
        info!(
            "Voiceover written to {} ({:.1}s, {} bytes)",
            audio.path.display(),
            audio.duration,
            audio.file_size
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaInfo, MockMediaComposer};
    use mockito::{Matcher, Server};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(base_url: String) -> SpeechConfig {
        SpeechConfig {
            base_url,
            api_key: Some("tts-key".to_string()),
            poll_interval_ms: 1,
            max_poll_attempts: 3,
            chunk_limit: 40,
            ..SpeechConfig::default()
        }
    }

    fn probing_media() -> MockMediaComposer {
        let mut media = MockMediaComposer::new();
        media.expect_probe().returning(|_| {
            Ok(MediaInfo {
                duration: 2.5,
                sample_rate: Some(32000),
                channels: Some(1),
                ..MediaInfo::default()
            })
        });
        media
    }

    #[tokio::test]
    async fn test_single_chunk_round_trip() {
        let mut server = Server::new_async().await;
        let submit = server
            .mock("POST", "/t2a_async")
            .match_header("authorization", "Bearer tts-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "text": "Xin chào.",
                "voice_setting": {"voice_id": "narrator"}
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"task_id": 42, "base_resp": {"status_code": 0, "status_msg": "success"}}"#)
            .create_async()
            .await;
        let query = server
            .mock("GET", "/query/t2a_async")
            .match_query(Matcher::UrlEncoded("task_id".into(), "42".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "Success", "file_id": "file-7"}"#)
            .create_async()
            .await;
        let download_url = format!("{}/download/file-7.mp3", server.url());
        let retrieve = server
            .mock("GET", "/files/retrieve")
            .match_query(Matcher::UrlEncoded("file_id".into(), "file-7".into()))
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({"file": {"download_url": download_url}}).to_string())
            .create_async()
            .await;
        let download = server
            .mock("GET", "/download/file-7.mp3")
            .with_body("ID3-fake-audio")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("voice.mp3");
        let synth = HttpSpeechSynthesizer::new(config(server.url()), Arc::new(probing_media())).unwrap();

        let audio = synth.synthesize("Xin chào.", "narrator", &out).await.unwrap();

        submit.assert_async().await;
        query.assert_async().await;
        retrieve.assert_async().await;
        download.assert_async().await;
        assert_eq!(std::fs::read(&out).unwrap(), b"ID3-fake-audio");
        assert_eq!(audio.duration, 2.5);
        assert_eq!(audio.file_size, 14);
        assert_eq!(audio.format, "mp3");
    }

    #[tokio::test]
    async fn test_polling_exhausts_into_timeout() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/t2a_async")
            .with_header("content-type", "application/json")
            .with_body(r#"{"task_id": "t-1"}"#)
            .create_async()
            .await;
        let query = server
            .mock("GET", "/query/t2a_async")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "Processing"}"#)
            .expect(3)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let synth = HttpSpeechSynthesizer::new(config(server.url()), Arc::new(MockMediaComposer::new())).unwrap();
        let err = synth
            .synthesize("Xin chào.", "narrator", &dir.path().join("voice.mp3"))
            .await
            .unwrap_err();

        query.assert_async().await;
        assert!(matches!(err, ReelcastError::SpeechTimeout { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_provider_failure_is_speech_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/t2a_async")
            .with_header("content-type", "application/json")
            .with_body(r#"{"task_id": "t-2"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/query/t2a_async")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "Failed"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let synth = HttpSpeechSynthesizer::new(config(server.url()), Arc::new(MockMediaComposer::new())).unwrap();
        let err = synth
            .synthesize("Xin chào.", "narrator", &dir.path().join("voice.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReelcastError::Speech(ref msg) if msg.contains("Failed")));
    }

    #[tokio::test]
    async fn test_rejected_submission_surfaces_status_msg() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/t2a_async")
            .with_header("content-type", "application/json")
            .with_body(r#"{"base_resp": {"status_code": 1004, "status_msg": "authentication failed"}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let synth = HttpSpeechSynthesizer::new(config(server.url()), Arc::new(MockMediaComposer::new())).unwrap();
        let err = synth
            .synthesize("Xin chào.", "narrator", &dir.path().join("voice.mp3"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn test_multi_chunk_output_is_concatenated() {
        let mut server = Server::new_async().await;
        let submit = server
            .mock("POST", "/t2a_async")
            .with_header("content-type", "application/json")
            .with_body(r#"{"task_id": "t-3"}"#)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/query/t2a_async")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "Success", "file_id": 9}"#)
            .create_async()
            .await;
        let download_url = format!("{}/download/9.mp3", server.url());
        server
            .mock("GET", "/files/retrieve")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({"file": {"download_url": download_url}}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/download/9.mp3")
            .with_body("chunk")
            .create_async()
            .await;

        let mut media = probing_media();
        media
            .expect_concat_audio()
            .withf(|parts, _| parts.len() == 2)
            .times(1)
            .returning(|_, out| {
                std::fs::write(out, b"chunkchunk")?;
                Ok(())
            });

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("voice.mp3");
        let mut cfg = config(server.url());
        cfg.chunk_limit = 60;
        let synth = HttpSpeechSynthesizer::new(cfg, Arc::new(media)).unwrap();
        let text = "Một câu chuyện thật dài bắt đầu từ đây. Và nó tiếp tục ở câu thứ hai này.";

        let audio = synth.synthesize(text, "narrator", &out).await.unwrap();

        submit.assert_async().await;
        assert_eq!(audio.file_size, 10);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_request() {
        let mut cfg = config("http://127.0.0.1:9".to_string());
        cfg.api_key = None;
        let synth = HttpSpeechSynthesizer::new(cfg, Arc::new(MockMediaComposer::new())).unwrap();
        let err = synth
            .synthesize("Xin chào.", "narrator", Path::new("unused.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelcastError::Speech(_)));
    }

    /// Retrieval that hands out the stale link first and a fresh one afterwards
    async fn rotating_retrieve(server: &mut Server, hits: usize) -> mockito::Mock {
        let base = server.url();
        let calls = Arc::new(AtomicUsize::new(0));
        server
            .mock("GET", "/files/retrieve")
            .match_query(Matcher::UrlEncoded("file_id".into(), "file-8".into()))
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                let name = if calls.fetch_add(1, Ordering::SeqCst) == 0 { "stale" } else { "fresh" };
                serde_json::json!({"file": {"download_url": format!("{}/download/{}.mp3", base, name)}})
                    .to_string()
                    .into_bytes()
            })
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_rejected_link_is_retrieved_again() {
        let mut server = Server::new_async().await;
        let retrieve = rotating_retrieve(&mut server, 2).await;
        let stale = server
            .mock("GET", "/download/stale.mp3")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/download/fresh.mp3")
            .with_body("ID3-fresh")
            .expect(1)
            .create_async()
            .await;

        let synth = HttpSpeechSynthesizer::new(config(server.url()), Arc::new(MockMediaComposer::new())).unwrap();
        let audio = synth.fetch_audio("file-8").await.unwrap();

        retrieve.assert_async().await;
        stale.assert_async().await;
        fresh.assert_async().await;
        assert_eq!(audio, b"ID3-fresh");
    }

    #[tokio::test]
    async fn test_expired_link_is_retrieved_before_download() {
        let mut server = Server::new_async().await;
        let retrieve = rotating_retrieve(&mut server, 2).await;
        let stale = server
            .mock("GET", "/download/stale.mp3")
            .expect(0)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/download/fresh.mp3")
            .with_body("ID3-fresh")
            .expect(1)
            .create_async()
            .await;

        let mut cfg = config(server.url());
        cfg.download_validity_secs = 0;
        let synth = HttpSpeechSynthesizer::new(cfg, Arc::new(MockMediaComposer::new())).unwrap();
        let audio = synth.fetch_audio("file-8").await.unwrap();

        retrieve.assert_async().await;
        stale.assert_async().await;
        fresh.assert_async().await;
        assert_eq!(audio, b"ID3-fresh");
    }

    #[tokio::test]
    async fn test_link_rejected_twice_is_speech_error() {
        let mut server = Server::new_async().await;
        let retrieve = rotating_retrieve(&mut server, 2).await;
        for name in ["stale", "fresh"] {
            server
                .mock("GET", format!("/download/{}.mp3", name).as_str())
                .with_status(410)
                .create_async()
                .await;
        }

        let synth = HttpSpeechSynthesizer::new(config(server.url()), Arc::new(MockMediaComposer::new())).unwrap();
        let err = synth.fetch_audio("file-8").await.unwrap_err();

        retrieve.assert_async().await;
        assert!(matches!(err, ReelcastError::Speech(ref msg) if msg.contains("410")));
    }

    #[test]
    fn test_id_to_string_accepts_numbers_and_strings() {
        assert_eq!(id_to_string(&serde_json::json!(42)), Some("42".to_string()));
        assert_eq!(id_to_string(&serde_json::json!("abc")), Some("abc".to_string()));
        assert_eq!(id_to_string(&serde_json::json!("")), None);
        assert_eq!(id_to_string(&serde_json::json!(null)), None);
    }
}
