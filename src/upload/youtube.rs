use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{UploadError, UploadMetadata, UploadResult, Uploader};
use crate::config::UploadConfig;
use crate::error::{Result, ReelcastError};

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
    #[serde(default)]
    status: Option<VideoStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    upload_status: Option<String>,
    privacy_status: Option<String>,
}

fn video_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// YouTube Data API uploader
pub struct YouTubeUploader {
    client: Client,
    config: UploadConfig,
}

impl YouTubeUploader {
    pub fn new(config: UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.upload_base.trim_end_matches('/')
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::from_status(status.as_u16(), &body).into())
    }

    /// Open a resumable session; returns the session URL
    async fn start_session(&self, metadata: &UploadMetadata, mime: &str, size: usize, token: &str) -> Result<String> {
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata.category_id,
            },
            "status": {
                "privacyStatus": metadata.privacy_status,
                "selfDeclaredMadeForKids": false,
            }
        });

        let response = self
            .client
            .post(format!("{}/videos", self.base()))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", mime)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::Failed {
                    status: response.status().as_u16(),
                    body: "resumable session response carried no Location header".to_string(),
                }
                .into()
            })
    }

    async fn send_video(&self, session_url: &str, bytes: Vec<u8>, mime: &str, token: &str) -> Result<VideoResource> {
        let response = self
            .client
            .put(session_url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await?;
        let response = Self::check(response).await?;

        Ok(response.json::<VideoResource>().await?)
    }

    async fn set_thumbnail(&self, video_id: &str, thumbnail_path: &Path, token: &str) -> Result<()> {
        let bytes = tokio::fs::read(thumbnail_path).await?;
        let response = self
            .client
            .post(format!("{}/thumbnails/set", self.base()))
            .query(&[("videoId", video_id)])
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, image_mime(thumbnail_path))
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Uploader for YouTubeUploader {
    async fn upload(
        &self,
        video_path: &Path,
        thumbnail_path: &Path,
        metadata: &UploadMetadata,
        access_token: &str,
    ) -> Result<UploadResult> {
        if !video_path.exists() {
            return Err(ReelcastError::FileNotFound(video_path.display().to_string()));
        }

        let bytes = tokio::fs::read(video_path).await?;
        let mime = video_mime(video_path);
        info!("Uploading {} ({} bytes) as \"{}\"", video_path.display(), bytes.len(), metadata.title);

        let session_url = self.start_session(metadata, mime, bytes.len(), access_token).await?;
        debug!("Resumable session opened");

        let video = self.send_video(&session_url, bytes, mime, access_token).await?;
        info!("Video uploaded with id {}", video.id);

        if thumbnail_path.exists() {
            self.set_thumbnail(&video.id, thumbnail_path, access_token).await?;
            info!("Thumbnail set for {}", video.id);
        } else {
            warn!("Thumbnail {} missing, video keeps the default frame", thumbnail_path.display());
        }

        let status = video
            .status
            .and_then(|s| s.upload_status.or(s.privacy_status))
            .unwrap_or_else(|| "uploaded".to_string());

        Ok(UploadResult {
            url: format!("{}{}", self.config.watch_url, video.id),
            video_id: video.id,
            status,
        })
    }
}
