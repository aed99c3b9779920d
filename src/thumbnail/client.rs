use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::placeholder::{save_image, spawn_placeholder};
use super::{ImageApiError, ImageResponse, ThumbnailGenerator, ThumbnailImage, build_prompt};
use crate::config::ThumbnailConfig;
use crate::error::Result;

/// Multimodal image generation client
pub struct HttpThumbnailGenerator {
    client: Client,
    config: ThumbnailConfig,
}

fn reference_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

impl HttpThumbnailGenerator {
    pub fn new(config: ThumbnailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Ask the API for an image; returns the raw response body
    async fn request_image(&self, reference: &Path, title: &str) -> std::result::Result<Value, ImageApiError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ImageApiError::MissingKey)?;

        let reference_bytes = tokio::fs::read(reference).await.map_err(|e| {
            ImageApiError::Other(format!("cannot read style reference {}: {}", reference.display(), e))
        })?;
        let prompt = build_prompt(title, self.config.width, self.config.height);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": prompt},
                    {"inline_data": {
                        "mime_type": reference_mime(reference),
                        "data": STANDARD.encode(&reference_bytes),
                    }}
                ]
            }],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]}
        });

        debug!("Requesting thumbnail from {} ({} byte reference)", self.url(), reference_bytes.len());
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageApiError::Other(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ImageApiError::Other(format!("failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(ImageApiError::from_status(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| ImageApiError::NoImageData(format!("response is not JSON: {}", e)))
    }

    async fn try_generate(
        &self,
        reference: &Path,
        title: &str,
        output: &Path,
    ) -> std::result::Result<ThumbnailImage, ImageApiError> {
        let body = self.request_image(reference, title).await?;

        let response = ImageResponse::classify(&body);
        debug!("Image response shape: {}", response.shape());
        let bytes = response.decode()?;

        let (width, height) = (self.config.width, self.config.height);
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|e| ImageApiError::NoImageData(format!("payload is not a decodable image: {}", e)))?;
            save_image(&decoded, &output, width, height)
                .map_err(|e| ImageApiError::Other(format!("failed to save thumbnail: {}", e)))
        })
        .await
        .map_err(|e| ImageApiError::Other(format!("thumbnail encoding task failed: {}", e)))?
    }

    fn log_diagnostic(error: &ImageApiError) {
        match error {
            ImageApiError::MissingKey => {
                warn!("No image API key configured (thumbnail.api_key / REELCAST_IMAGE_API_KEY); using placeholder")
            }
            ImageApiError::InvalidKey(detail) => {
                warn!("Image API rejected the key, check thumbnail.api_key; using placeholder: {}", detail)
            }
            ImageApiError::RateLimited(detail) => {
                warn!("Image API rate limit reached, try again later; using placeholder: {}", detail)
            }
            ImageApiError::ModelNotFound(detail) => {
                warn!("Image model not available, check thumbnail.model; using placeholder: {}", detail)
            }
            ImageApiError::NoImageData(detail) => {
                warn!("Image API returned no usable image; using placeholder: {}", detail)
            }
            ImageApiError::Other(detail) => warn!("Thumbnail generation failed; using placeholder: {}", detail),
        }
    }
}

#[async_trait]
impl ThumbnailGenerator for HttpThumbnailGenerator {
    async fn generate_thumbnail(
        &self,
        style_reference_path: &Path,
        title: &str,
        output_path: &Path,
    ) -> Result<ThumbnailImage> {
        info!("Generating thumbnail for \"{}\" -> {}", title, output_path.display());

        match self.try_generate(style_reference_path, title, output_path).await {
            Ok(thumbnail) => {
                info!("Thumbnail generated: {} ({} bytes)", thumbnail.path.display(), thumbnail.file_size);
                Ok(thumbnail)
            }
            Err(e) => {
                Self::log_diagnostic(&e);
                spawn_placeholder(
                    output_path,
                    self.config.width,
                    self.config.height,
                    self.config.placeholder_color,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use mockito::{Matcher, Server};
    use std::io::Cursor;

    fn config(endpoint: String) -> ThumbnailConfig {
        ThumbnailConfig {
            endpoint,
            api_key: Some("img-key".to_string()),
            model: "test-model".to_string(),
            width: 64,
            height: 36,
            placeholder_color: [1, 2, 3],
            ..ThumbnailConfig::default()
        }
    }

    fn png_base64(color: [u8; 3]) -> String {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 9, Rgb(color)));
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        STANDARD.encode(buf)
    }

    fn reference(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("avatar.png");
        std::fs::write(&path, b"not really a png, only sent as reference").unwrap();
        path
    }

    #[tokio::test]
    async fn test_generated_image_is_normalized_and_saved() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_header("x-goog-api-key", "img-key")
            .match_body(Matcher::Regex("inline_data".to_string()))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"candidates": [{"content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": png_base64([200, 10, 10])}}
                ]}}]})
                .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("thumb.png");
        let generator = HttpThumbnailGenerator::new(config(server.url())).unwrap();

        let thumb = generator
            .generate_thumbnail(&reference(dir.path()), "Cô bé bán diêm", &out)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(!thumb.placeholder);
        let saved = image::open(&out).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (64, 36));
        assert_eq!(saved.get_pixel(32, 18), &Rgb([200, 10, 10]));
    }

    #[tokio::test]
    async fn test_rate_limit_degrades_to_placeholder() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .with_status(429)
            .with_body(r#"{"error": {"status": "RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("thumb.png");
        let generator = HttpThumbnailGenerator::new(config(server.url())).unwrap();

        let thumb = generator
            .generate_thumbnail(&reference(dir.path()), "Title", &out)
            .await
            .unwrap();

        assert!(thumb.placeholder);
        let saved = image::open(&out).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (64, 36));
        assert_eq!(saved.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_text_only_answer_degrades_to_placeholder() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "Sorry, no images today."}]}}]}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("thumb.png");
        let generator = HttpThumbnailGenerator::new(config(server.url())).unwrap();

        let thumb = generator
            .generate_thumbnail(&reference(dir.path()), "Title", &out)
            .await
            .unwrap();
        assert!(thumb.placeholder);
        assert!(out.exists());
    }

    #[tokio::test]
    async fn test_missing_key_never_calls_api() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut cfg = config(server.url());
        cfg.api_key = None;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("thumb.png");
        let generator = HttpThumbnailGenerator::new(cfg).unwrap();

        let thumb = generator
            .generate_thumbnail(&reference(dir.path()), "Title", &out)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(thumb.placeholder);
    }

    #[test]
    fn test_reference_mime_from_extension() {
        assert_eq!(reference_mime(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(reference_mime(Path::new("a.webp")), "image/webp");
        assert_eq!(reference_mime(Path::new("a")), "image/png");
    }
}
