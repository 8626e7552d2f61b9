pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod prompt;
pub mod ranking;
pub mod screenshot;
pub mod storage;
pub mod store;

pub use config::CritiqueConfig;
pub use error::CritiqueError;
pub use extract::extract_json;
pub use models::{
    Analysis, AnalysisStatus, Category, Interaction, InteractionAction, Level, ModelOutput,
    Recommendation, RecommendationDraft,
};
pub use gateway::{create_gateway, GatewayError, MediaRef, ModelGateway};
pub use ranking::{rank, score, RankedPayload, SLATE_SIZE};
pub use screenshot::{ScreenshotClient, ScreenshotError};
pub use storage::{LocalObjectStore, ObjectStore, StorageError};
pub use store::RecommendationStore;
