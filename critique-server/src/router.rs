//! `/analyze` request decoding and dispatch.
//!
//! One endpoint carries two request shapes: a fresh analysis, or an
//! interaction on an existing one. A body with an `action` field is always
//! an interaction.

use std::collections::HashSet;

use critique_core::{CritiqueError, InteractionAction};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::subsystems::analyze::{run_analysis, AnalysisPayload, AnalyzeInput};
use crate::subsystems::{interact, Services};

#[derive(Debug, Deserialize)]
pub struct InitialRequest {
    pub url: Option<String>,
    #[serde(rename = "screenshotPath", alias = "screenshot_path")]
    pub screenshot_path: Option<String>,
    #[serde(rename = "screenshotPaths", alias = "screenshot_paths", default)]
    pub screenshot_paths: Vec<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(alias = "recId")]
    pub rec_id: String,
    #[serde(alias = "analysisId")]
    pub analysis_id: String,
}

#[derive(Debug)]
pub enum AnalyzeRequest {
    Initial(AnalyzeInput),
    Action {
        analysis_id: Uuid,
        rec_key: String,
        action: InteractionAction,
    },
}

impl AnalyzeRequest {
    pub fn from_value(body: Value) -> Result<Self, CritiqueError> {
        let bad = |e: serde_json::Error| CritiqueError::BadRequest(e.to_string());

        if body.get("action").is_some() {
            let req: ActionRequest = serde_json::from_value(body).map_err(bad)?;
            let action = match req.action.as_str() {
                "upvote" => InteractionAction::Upvote,
                "downvote" => InteractionAction::Downvote,
                other => {
                    return Err(CritiqueError::BadRequest(format!("unknown action '{}'", other)))
                }
            };
            let analysis_id = Uuid::parse_str(req.analysis_id.trim()).map_err(|_| {
                CritiqueError::BadRequest(format!("invalid analysis_id '{}'", req.analysis_id))
            })?;
            return Ok(AnalyzeRequest::Action {
                analysis_id,
                rec_key: req.rec_id,
                action,
            });
        }

        let req: InitialRequest = serde_json::from_value(body).map_err(bad)?;
        let context = match req.context {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m,
            Some(_) => return Err(CritiqueError::BadRequest("context must be an object".into())),
        };

        let mut screenshot_paths = req.screenshot_paths;
        if let Some(p) = req.screenshot_path {
            screenshot_paths.insert(0, p);
        }
        let mut seen = HashSet::new();
        screenshot_paths.retain(|p| !p.trim().is_empty() && seen.insert(p.clone()));

        Ok(AnalyzeRequest::Initial(AnalyzeInput {
            url: req.url.filter(|u| !u.trim().is_empty()),
            screenshot_paths,
            context,
        }))
    }
}

pub async fn handle_analyze(
    request: AnalyzeRequest,
    services: &Services,
) -> Result<AnalysisPayload, CritiqueError> {
    match request {
        AnalyzeRequest::Initial(input) => run_analysis(services, input).await,
        AnalyzeRequest::Action {
            analysis_id,
            rec_key,
            action,
        } => interact::apply_action(services, analysis_id, &rec_key, action).await,
    }
}
