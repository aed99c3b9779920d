// Upload architecture
//
// - Metadata: title/description/tags derived from the story
// - YouTube: resumable video upload followed by a thumbnail set
// - OAuth: access token refresh right before an upload

pub mod oauth;
pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

pub use oauth::OAuthTokenRefresher;
pub use youtube::YouTubeUploader;

use crate::config::UploadConfig;
use crate::error::Result;

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_BODY_CHARS: usize = 4500;
const MAX_TAGS_CHARS: usize = 500;
const MIN_TAG_WORD_CHARS: usize = 3;

/// Outcome of a finished upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub video_id: String,
    pub url: String,
    /// Processing/privacy status reported by the platform
    pub status: String,
}

/// Failures reported by the video platform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("access token expired or revoked")]
    AuthExpired,

    #[error("upload quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("upload failed with status {status}: {body}")]
    Failed { status: u16, body: String },
}

impl UploadError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail: String = body.chars().take(500).collect();
        match status {
            401 => Self::AuthExpired,
            403 if body.contains("quotaExceeded") || body.contains("uploadLimitExceeded") => {
                Self::QuotaExceeded(detail)
            }
            429 => Self::QuotaExceeded(detail),
            _ => Self::Failed { status, body: detail },
        }
    }
}

/// Snippet and status sent along with the video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl UploadMetadata {
    pub fn from_story(title: &str, text: &str, config: &UploadConfig) -> Self {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        let title: String = title.chars().take(MAX_TITLE_CHARS).collect();

        let opening = truncate_at_word(text.trim(), MAX_DESCRIPTION_BODY_CHARS);
        let description = if config.description_footer.is_empty() {
            opening
        } else {
            format!("{}\n\n{}", opening, config.description_footer)
        };

        Self {
            tags: derive_tags(&title, &config.default_tags),
            title,
            description,
            category_id: config.category_id.clone(),
            privacy_status: config.privacy_status.clone(),
        }
    }
}

/// Cut `text` to at most `limit` chars, preferring the last word boundary
fn truncate_at_word(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let cut: String = text.chars().take(limit).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

fn derive_tags(title: &str, defaults: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    let mut total = 0;

    let title_words = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TAG_WORD_CHARS)
        .map(str::to_lowercase);

    let candidates = defaults.iter().map(|t| t.trim().to_string()).chain(title_words);
    for tag in candidates {
        if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
            continue;
        }
        let len = tag.chars().count();
        if total + len > MAX_TAGS_CHARS {
            break;
        }
        total += len;
        tags.push(tag);
    }

    tags
}

/// Video platform upload
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        video_path: &Path,
        thumbnail_path: &Path,
        metadata: &UploadMetadata,
        access_token: &str,
    ) -> Result<UploadResult>;
}

/// Produces a usable access token right before an upload
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, access_token: &str) -> Result<String>;
}

/// Factory for creating upload adapters
pub struct UploaderFactory;

impl UploaderFactory {
    pub fn create_uploader(config: UploadConfig) -> Result<Box<dyn Uploader>> {
        Ok(Box::new(YouTubeUploader::new(config)?))
    }

    pub fn create_refresher(config: UploadConfig) -> Result<Box<dyn TokenRefresher>> {
        Ok(Box::new(OAuthTokenRefresher::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_capped_at_100_chars() {
        let config = UploadConfig::default();
        let metadata = UploadMetadata::from_story(&"ồ".repeat(150), "Story.", &config);
        assert_eq!(metadata.title.chars().count(), 100);
    }

    #[test]
    fn test_description_is_cut_at_word_boundary() {
        let config = UploadConfig {
            description_footer: "Footer".to_string(),
            ..UploadConfig::default()
        };
        let text = "word ".repeat(2000);

        let metadata = UploadMetadata::from_story("Title", &text, &config);

        let (body, footer) = metadata.description.split_once("\n\n").unwrap();
        assert_eq!(footer, "Footer");
        assert!(body.chars().count() <= MAX_DESCRIPTION_BODY_CHARS + 1);
        assert!(body.ends_with("word…"));
    }

    #[test]
    fn test_short_description_is_kept_whole() {
        let config = UploadConfig {
            description_footer: String::new(),
            ..UploadConfig::default()
        };
        let metadata = UploadMetadata::from_story("Title", "  Xin chào.  ", &config);
        assert_eq!(metadata.description, "Xin chào.");
    }

    #[test]
    fn test_tags_merge_defaults_and_title_words() {
        let config = UploadConfig::default();
        let metadata = UploadMetadata::from_story("The Little Match Girl and the Story", "x", &config);

        assert_eq!(
            metadata.tags,
            vec!["audiobook", "cooking", "story", "the", "little", "match", "girl", "and"]
        );
        assert_eq!(metadata.privacy_status, "private");
        assert_eq!(metadata.category_id, "26");
    }

    #[test]
    fn test_tags_respect_total_length() {
        let config = UploadConfig {
            default_tags: vec![],
            ..UploadConfig::default()
        };
        let title: String = (0..60).map(|i| format!("word{:03} ", i)).collect();

        let metadata = UploadMetadata::from_story(&title, "x", &config);

        let total: usize = metadata.tags.iter().map(|t| t.chars().count()).sum();
        assert!(total <= MAX_TAGS_CHARS);
        assert!(!metadata.tags.is_empty());
    }

    #[test]
    fn test_upload_status_mapping() {
        assert_eq!(UploadError::from_status(401, ""), UploadError::AuthExpired);
        assert!(matches!(
            UploadError::from_status(403, r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#),
            UploadError::QuotaExceeded(_)
        ));
        assert!(matches!(UploadError::from_status(429, ""), UploadError::QuotaExceeded(_)));
        assert!(matches!(
            UploadError::from_status(403, "forbidden"),
            UploadError::Failed { status: 403, .. }
        ));
    }
}
