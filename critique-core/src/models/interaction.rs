use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionAction {
    Upvote,
    Downvote,
}

impl InteractionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionAction::Upvote => "upvote",
            InteractionAction::Downvote => "downvote",
        }
    }
}

/// Append-only audit entry for a client vote.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Interaction {
    pub id: i64,
    pub analysis_id: Uuid,
    pub rec_key: String,
    pub action: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
