//! Model gateway: vendor-agnostic access to a generative model.
//!
//! Provides a `ModelGateway` trait with implementations for:
//! - **Gemini**: `generateContent`, images inlined as base64
//! - **OpenAI-compatible**: `chat/completions`, images passed by URL
//!
//! Each adapter holds an ordered list of model identifiers and returns the
//! first successful completion. There is no retry loop beyond that list.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// ModelGateway trait
// ============================================================================

/// A fetchable image the model should look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
}

impl MediaRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send the prompt and images, return the raw text output.
    async fn generate(&self, prompt: &str, media: &[MediaRef]) -> Result<String, GatewayError>;

    /// Adapter name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Failed to fetch image {url}: {message}")]
    MediaFetch { url: String, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("No model identifiers configured")]
    NoModels,

    #[error("Unknown model provider '{0}'")]
    UnknownProvider(String),

    #[error("All {} model attempts failed: {}", .attempts.len(), .attempts.join("; "))]
    AllModelsFailed { attempts: Vec<String> },
}

/// Request URLs carry credentials, so they never reach the message.
impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.without_url())
    }
}

// ============================================================================
// Config + factory
// ============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub models: Vec<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    fn validate(&self) -> Result<(), GatewayError> {
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::MissingApiKey);
        }
        if self.models.is_empty() {
            return Err(GatewayError::NoModels);
        }
        Ok(())
    }

    fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

/// Create the adapter selected by `[model] provider`.
pub fn create_gateway(config: &ModelConfig) -> Result<Box<dyn ModelGateway>, GatewayError> {
    let api_key = config.api_key().ok_or(GatewayError::MissingApiKey)?;
    let default_base = match config.provider.as_str() {
        "gemini" => GEMINI_BASE_URL,
        "openai" => OPENAI_BASE_URL,
        other => return Err(GatewayError::UnknownProvider(other.to_string())),
    };

    let gateway_config = GatewayConfig {
        api_key,
        models: config.models.clone(),
        base_url: config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base.to_string()),
        timeout: Duration::from_secs(config.timeout_seconds),
    };

    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiGateway::new(gateway_config)?)),
        _ => Ok(Box::new(GeminiGateway::new(gateway_config)?)),
    }
}

fn log_attempt_failure(adapter: &str, model: &str, error: &GatewayError) {
    tracing::warn!(adapter = adapter, model = model, error = %error, "Model attempt failed, trying next");
}

async fn api_error(response: reqwest::Response) -> GatewayError {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: Option<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(body);

    GatewayError::Api { code, message }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

// ============================================================================
// GeminiGateway
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: Client,
    config: GatewayConfig,
}

impl GeminiGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let client = config.client()?;
        Ok(Self { client, config })
    }

    async fn inline_media(&self, media: &[MediaRef]) -> Result<Vec<GeminiInlineData>, GatewayError> {
        let mut out = Vec::with_capacity(media.len());
        for m in media {
            let response = self.client.get(&m.url).send().await.map_err(|e| {
                GatewayError::MediaFetch {
                    url: m.url.clone(),
                    message: e.without_url().to_string(),
                }
            })?;
            if !response.status().is_success() {
                return Err(GatewayError::MediaFetch {
                    url: m.url.clone(),
                    message: format!("status {}", response.status()),
                });
            }
            let mime_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
                .filter(|s| s.starts_with("image/"))
                .unwrap_or_else(|| "image/png".to_string());
            let bytes = response.bytes().await?;
            out.push(GeminiInlineData {
                mime_type,
                data: BASE64.encode(&bytes),
            });
        }
        Ok(out)
    }

    async fn generate_once(
        &self,
        model: &str,
        prompt: &str,
        images: &[GeminiInlineData],
    ) -> Result<String, GatewayError> {
        let url = format!("{}/models/{}:generateContent", self.config.base_url, model);

        let mut parts = vec![GeminiPart::Text {
            text: prompt.to_string(),
        }];
        parts.extend(images.iter().cloned().map(|inline_data| GeminiPart::Inline { inline_data }));

        let request = GeminiRequest {
            contents: vec![GeminiContent { role: "user", parts }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.4,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: GeminiResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn generate(&self, prompt: &str, media: &[MediaRef]) -> Result<String, GatewayError> {
        let images = self.inline_media(media).await?;
        let mut attempts = Vec::new();

        for model in &self.config.models {
            match self.generate_once(model, prompt, &images).await {
                Ok(text) => {
                    tracing::info!(model = %model, chars = text.len(), "Gemini generation succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    log_attempt_failure(self.name(), model, &e);
                    attempts.push(format!("{}: {}", model, e));
                }
            }
        }

        Err(GatewayError::AllModelsFailed { attempts })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// OpenAI-compatible API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContent {
    Text { text: String },
    ImageUrl { image_url: ChatImageUrl },
}

#[derive(Debug, Serialize)]
struct ChatImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

// ============================================================================
// OpenAiGateway
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    client: Client,
    config: GatewayConfig,
}

impl OpenAiGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let client = config.client()?;
        Ok(Self { client, config })
    }

    async fn generate_once(
        &self,
        model: &str,
        prompt: &str,
        media: &[MediaRef],
    ) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut content = vec![ChatContent::Text {
            text: prompt.to_string(),
        }];
        content.extend(media.iter().map(|m| ChatContent::ImageUrl {
            image_url: ChatImageUrl { url: m.url.clone() },
        }));

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            temperature: 0.4,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: ChatResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn generate(&self, prompt: &str, media: &[MediaRef]) -> Result<String, GatewayError> {
        let mut attempts = Vec::new();

        for model in &self.config.models {
            match self.generate_once(model, prompt, media).await {
                Ok(text) => {
                    tracing::info!(model = %model, chars = text.len(), "OpenAI generation succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    log_attempt_failure(self.name(), model, &e);
                    attempts.push(format!("{}: {}", model, e));
                }
            }
        }

        Err(GatewayError::AllModelsFailed { attempts })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================
