use thiserror::Error;

use crate::gateway::GatewayError;
use crate::screenshot::ScreenshotError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum CritiqueError {
    /// A required credential or URL is missing. Nothing is written.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The screenshot or model provider returned a failure.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Model output was unparseable or had the wrong shape.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GatewayError> for CritiqueError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::MissingApiKey | GatewayError::NoModels => {
                CritiqueError::Configuration(e.to_string())
            }
            other => CritiqueError::Upstream(other.to_string()),
        }
    }
}

impl From<ScreenshotError> for CritiqueError {
    fn from(e: ScreenshotError) -> Self {
        match e {
            ScreenshotError::MissingApiKey | ScreenshotError::MissingEndpoint => {
                CritiqueError::Configuration(e.to_string())
            }
            ScreenshotError::InvalidUrl(_) => CritiqueError::BadRequest(e.to_string()),
            other => CritiqueError::Upstream(other.to_string()),
        }
    }
}

impl From<StorageError> for CritiqueError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(io) => CritiqueError::Io(io),
            other => CritiqueError::BadRequest(other.to_string()),
        }
    }
}

impl CritiqueError {
    /// Upstream failures are the only ones recorded as a `failed` analysis row.
    pub fn is_upstream(&self) -> bool {
        matches!(self, CritiqueError::Upstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_maps_to_configuration() {
        let err: CritiqueError = GatewayError::MissingApiKey.into();
        assert!(matches!(err, CritiqueError::Configuration(_)));
        assert!(!err.is_upstream());
    }

    #[test]
    fn test_exhausted_models_map_to_upstream() {
        let err: CritiqueError = GatewayError::AllModelsFailed {
            attempts: vec!["m1: boom".to_string()],
        }
        .into();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("m1: boom"));
    }

    #[test]
    fn test_screenshot_unconfigured_maps_to_configuration() {
        let err: CritiqueError = ScreenshotError::MissingEndpoint.into();
        assert!(matches!(err, CritiqueError::Configuration(_)));
    }
}
