//! Screenshot capture via a third-party HTTP capture API.
//!
//! The endpoint receives `url`, `access_key`, `width`, `height`, `full_page`
//! and `format` query parameters and answers with image bytes.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Url};
use thiserror::Error;

use crate::config::ScreenshotConfig;

#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Capture API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Capture API returned an empty image")]
    EmptyImage,

    #[error("Invalid page URL '{0}'")]
    InvalidUrl(String),

    #[error("Screenshot endpoint is not configured")]
    MissingEndpoint,

    #[error("Missing screenshot API key")]
    MissingApiKey,
}

/// The capture key rides in the query string; drop the URL from the message.
impl From<reqwest::Error> for ScreenshotError {
    fn from(e: reqwest::Error) -> Self {
        ScreenshotError::Http(e.without_url())
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotClient {
    client: Client,
    endpoint: String,
    api_key: String,
    width: u32,
    height: u32,
    full_page: bool,
}

impl ScreenshotClient {
    pub fn from_config(config: &ScreenshotConfig) -> Result<Self, ScreenshotError> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or(ScreenshotError::MissingEndpoint)?;
        let api_key = config.api_key().ok_or(ScreenshotError::MissingApiKey)?;
        Self::new(endpoint, api_key, config)
    }

    pub fn new(
        endpoint: String,
        api_key: String,
        config: &ScreenshotConfig,
    ) -> Result<Self, ScreenshotError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            width: config.width,
            height: config.height,
            full_page: config.full_page,
        })
    }

    /// Capture `page_url` and return PNG bytes.
    pub async fn capture(&self, page_url: &str) -> Result<Bytes, ScreenshotError> {
        let parsed = Url::parse(page_url.trim())
            .map_err(|_| ScreenshotError::InvalidUrl(page_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScreenshotError::InvalidUrl(page_url.to_string()));
        }

        let width = self.width.to_string();
        let height = self.height.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("url", parsed.as_str()),
                ("access_key", self.api_key.as_str()),
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("full_page", if self.full_page { "true" } else { "false" }),
                ("format", "png"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Screenshot API error");
            return Err(ScreenshotError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ScreenshotError::EmptyImage);
        }

        tracing::info!(url = %parsed, bytes = bytes.len(), "Captured screenshot");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ScreenshotClient {
        ScreenshotClient::new(
            format!("{}/capture", server.uri()),
            "shot-key".to_string(),
            &ScreenshotConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_capture_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/capture"))
            .and(query_param("url", "https://shop.example/"))
            .and(query_param("access_key", "shot-key"))
            .and(query_param("format", "png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&server)
            .await;

        let bytes = client_for(&server).capture("https://shop.example/").await.unwrap();
        assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_capture_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        match client_for(&server).capture("https://shop.example").await {
            Err(ScreenshotError::Api { code, message }) => {
                assert_eq!(code, 402);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capture_rejects_non_http_urls() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        assert!(matches!(
            client.capture("ftp://files.example").await,
            Err(ScreenshotError::InvalidUrl(_))
        ));
        assert!(matches!(
            client.capture("not a url").await,
            Err(ScreenshotError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).capture("https://shop.example").await,
            Err(ScreenshotError::EmptyImage)
        ));
    }

    #[tokio::test]
    async fn test_timeout_message_omits_access_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut client = ScreenshotClient::new(
            format!("{}/capture", server.uri()),
            "SECRET-SHOT-KEY".to_string(),
            &ScreenshotConfig::default(),
        )
        .unwrap();
        client.client = Client::builder()
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap();

        let err = client.capture("https://shop.example").await.unwrap_err();
        assert!(matches!(err, ScreenshotError::Http(_)));
        let outward = crate::CritiqueError::from(err).to_string();
        assert!(outward.starts_with("Upstream error"), "{}", outward);
        assert!(!outward.contains("SECRET-SHOT-KEY"), "key leaked: {}", outward);
    }

    #[test]
    fn test_unconfigured_endpoint() {
        let config = ScreenshotConfig::default();
        assert!(matches!(
            ScreenshotClient::from_config(&config),
            Err(ScreenshotError::MissingEndpoint)
        ));
    }
}
