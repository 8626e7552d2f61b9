pub mod analyze;
pub mod interact;
pub mod scan;

use std::sync::Arc;

use critique_core::gateway::create_gateway;
use critique_core::{
    CritiqueConfig, CritiqueError, LocalObjectStore, ModelGateway, ObjectStore,
    RecommendationStore, ScreenshotClient,
};
use sqlx::PgPool;

/// Collaborators shared by every request.
///
/// The gateway and screenshot client are optional so the server can start
/// without credentials; requests that need them fail with a configuration
/// error instead.
#[derive(Clone)]
pub struct Services {
    pub store: RecommendationStore,
    pub gateway: Option<Arc<dyn ModelGateway>>,
    pub screenshots: Option<ScreenshotClient>,
    pub objects: Arc<dyn ObjectStore>,
    pub prompt_prefix: Option<String>,
    pub server_replacement: bool,
}

impl Services {
    pub fn from_config(pool: PgPool, config: &CritiqueConfig) -> Self {
        let gateway: Option<Arc<dyn ModelGateway>> = match create_gateway(&config.model) {
            Ok(g) => {
                tracing::info!(adapter = g.name(), models = ?config.model.models, "Model gateway ready");
                Some(Arc::from(g))
            }
            Err(e) => {
                tracing::warn!("Model gateway unavailable: {}", e);
                None
            }
        };

        let screenshots = match ScreenshotClient::from_config(&config.screenshot) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Screenshot capture unavailable: {}", e);
                None
            }
        };

        Self {
            store: RecommendationStore::new(pool),
            gateway,
            screenshots,
            objects: Arc::new(LocalObjectStore::from_config(&config.storage)),
            prompt_prefix: config.prompt.prefix.clone(),
            server_replacement: config.interaction.server_replacement,
        }
    }

    pub(crate) fn gateway(&self) -> Result<&dyn ModelGateway, CritiqueError> {
        self.gateway
            .as_deref()
            .ok_or_else(|| CritiqueError::Configuration("model gateway is not configured".into()))
    }

    pub(crate) fn screenshots(&self) -> Result<&ScreenshotClient, CritiqueError> {
        self.screenshots
            .as_ref()
            .ok_or_else(|| CritiqueError::Configuration("screenshot capture is not configured".into()))
    }
}
