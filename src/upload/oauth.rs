use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::TokenRefresher;
use crate::config::UploadConfig;
use crate::error::{Result, ReelcastError};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Refresh-token grant against the OAuth token endpoint
pub struct OAuthTokenRefresher {
    client: Client,
    config: UploadConfig,
}

impl OAuthTokenRefresher {
    pub fn new(config: UploadConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    fn credentials(&self) -> Option<(&str, &str, &str)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.trim().is_empty())
        }

        Some((
            non_empty(&self.config.client_id)?,
            non_empty(&self.config.client_secret)?,
            non_empty(&self.config.refresh_token)?,
        ))
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(&self, access_token: &str) -> Result<String> {
        let Some((client_id, client_secret, refresh_token)) = self.credentials() else {
            debug!("No refresh credentials configured, using the supplied access token");
            return Ok(access_token.to_string());
        };

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelcastError::Auth(format!("token refresh failed with status {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(ReelcastError::Auth("token endpoint returned an empty access token".to_string()));
        }

        info!("Access token refreshed (expires in {}s)", token.expires_in.unwrap_or(0));
        Ok(token.access_token)
    }
}
