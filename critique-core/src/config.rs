use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CritiqueConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub screenshot: ScreenshotConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_acquire_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Generative model settings. `models` is the ordered fallback list.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// "gemini" or "openai"
    pub provider: String,
    pub models: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

fn default_model_timeout() -> u64 {
    90
}

impl ModelConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScreenshotConfig {
    /// Capture endpoint; receives `url` and `access_key` query parameters.
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub width: u32,
    pub height: u32,
    pub full_page: bool,
    pub timeout_seconds: u64,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "SCREENSHOT_API_KEY".to_string(),
            width: 1440,
            height: 900,
            full_page: true,
            timeout_seconds: 60,
        }
    }
}

impl ScreenshotConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root_dir: String,
    /// Base URL the stored objects are fetchable from.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: "data/screenshots".to_string(),
            public_base_url: "http://127.0.0.1:8787/screenshots".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Static text placed ahead of every generated prompt.
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InteractionConfig {
    /// Fetch one fresh recommendation from the model after each downvote.
    pub server_replacement: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            server_replacement: true,
        }
    }
}

impl CritiqueConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }

    /// Parse from an in-memory TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}
