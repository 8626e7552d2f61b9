//! Analyze pipeline: prompt → gateway → extract → validate → store → rank.

use critique_core::models::ModelOutput;
use critique_core::prompt::build_analysis_prompt;
use critique_core::{CritiqueError, MediaRef, ObjectStore, RankedPayload, Recommendation, RecommendationStore};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Services;

/// What a client needs to render the results view.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPayload {
    pub analysis_id: Uuid,
    pub summary: String,
    /// The slate.
    pub recommendations: Vec<Recommendation>,
    pub recommendations_all: Vec<Recommendation>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeInput {
    pub url: Option<String>,
    pub screenshot_paths: Vec<String>,
    pub context: Map<String, Value>,
}

impl AnalyzeInput {
    /// Context as the model sees it; the page URL is folded in when the
    /// caller did not supply one.
    fn prompt_context(&self) -> Map<String, Value> {
        let mut context = self.context.clone();
        if let Some(url) = &self.url {
            context
                .entry("url")
                .or_insert_with(|| Value::String(url.clone()));
        }
        context
    }
}

/// Re-derive the ranked payload from the store. Unknown analyses yield an
/// empty payload.
pub async fn load_payload(
    store: &RecommendationStore,
    analysis_id: Uuid,
) -> Result<AnalysisPayload, CritiqueError> {
    let summary = store
        .get_analysis(analysis_id)
        .await?
        .map(|a| a.summary)
        .unwrap_or_default();
    let active = store.list_active(analysis_id).await?;
    let ranked = RankedPayload::from_active(active);

    Ok(AnalysisPayload {
        analysis_id,
        summary,
        recommendations: ranked.top3,
        recommendations_all: ranked.all,
    })
}

pub(crate) fn media_for(
    objects: &dyn ObjectStore,
    paths: &[String],
) -> Result<Vec<MediaRef>, CritiqueError> {
    paths
        .iter()
        .map(|p| Ok(MediaRef::new(objects.public_url(p)?)))
        .collect()
}

/// Run one analysis end to end.
///
/// Upstream failures are recorded as a `failed` analysis before the error
/// is returned. Validation failures write nothing.
pub async fn run_analysis(
    services: &Services,
    input: AnalyzeInput,
) -> Result<AnalysisPayload, CritiqueError> {
    if input.url.is_none() && input.screenshot_paths.is_empty() && input.context.is_empty() {
        return Err(CritiqueError::BadRequest(
            "nothing to analyze: provide a url, screenshots or context".into(),
        ));
    }

    let gateway = services.gateway()?;
    let media = media_for(services.objects.as_ref(), &input.screenshot_paths)?;
    let prompt = build_analysis_prompt(&input.prompt_context(), services.prompt_prefix.as_deref());
    let context = Value::Object(input.context.clone());

    tracing::info!(
        adapter = gateway.name(),
        screenshots = media.len(),
        "Requesting analysis from model"
    );

    let text = match gateway.generate(&prompt, &media).await {
        Ok(t) => t,
        Err(e) => {
            let err = CritiqueError::from(e);
            if err.is_upstream() {
                if let Err(db_err) = services
                    .store
                    .record_failed_analysis(
                        input.url.as_deref(),
                        &input.screenshot_paths,
                        &context,
                        &err.to_string(),
                    )
                    .await
                {
                    tracing::warn!(error = %db_err, "Failed to record failed analysis");
                }
            }
            return Err(err);
        }
    };

    let parsed = match ModelOutput::from_model_text(&text) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, raw_len = text.len(), "Model output rejected");
            return Err(e);
        }
    };

    let analysis_id = services
        .store
        .create_analysis(
            parsed,
            input.url.as_deref(),
            &input.screenshot_paths,
            &context,
            &text,
        )
        .await?;

    load_payload(&services.store, analysis_id).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::subsystems::testing::{
        make_pool, services, seven_recommendations_text, unreachable_pool, ScriptedGateway,
        DATABASE_URL,
    };
    use critique_core::models::AnalysisStatus;
    use critique_core::GatewayError;
    use serde_json::json;
    use sqlx::PgPool;

    fn input() -> AnalyzeInput {
        let mut context = Map::new();
        context.insert("industry".into(), json!("ecommerce"));
        context.insert("goal".into(), json!("more checkouts"));
        AnalyzeInput {
            url: Some("https://shop.example".into()),
            screenshot_paths: vec!["2026-01-01/home.png".into()],
            context,
        }
    }

    #[test]
    fn test_prompt_context_folds_in_url() {
        let ctx = input().prompt_context();
        assert_eq!(ctx["url"], "https://shop.example");

        let mut explicit = input();
        explicit.context.insert("url".into(), json!("https://other.example"));
        assert_eq!(explicit.prompt_context()["url"], "https://other.example");
    }

    #[test]
    fn test_media_resolves_public_urls() {
        let objects = critique_core::LocalObjectStore::new("/tmp/x", "http://assets.test/shots");
        let media = media_for(&objects, &["a/b.png".to_string()]).unwrap();
        assert_eq!(media, vec![MediaRef::new("http://assets.test/shots/a/b.png")]);
    }

    // ========================================================================
    // TEST 1: fenced model output → 7 rows, top-3 ranked by score
    // ========================================================================
    #[tokio::test]
    async fn test_run_analysis_ranks_initial_payload() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_run_analysis_ranks_initial_payload: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(seven_recommendations_text())]));
        let svc = services(pool, Some(gateway.clone()));

        let payload = run_analysis(&svc, input()).await.unwrap();
        assert_eq!(payload.summary, "Solid page with friction");
        assert_eq!(payload.recommendations_all.len(), 7);
        let top: Vec<&str> = payload.recommendations.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(top, vec!["r1", "r2", "r3"]);
        assert!(payload.recommendations.iter().all(|r| r.votes == 0));

        let media = gateway.media.lock().unwrap();
        assert_eq!(media[0], vec![MediaRef::new("http://assets.test/2026-01-01/home.png")]);
        let prompts = gateway.prompts.lock().unwrap();
        assert!(prompts[0].contains("ecommerce"));
    }

    // ========================================================================
    // TEST 2: six recommendations → validation error, nothing persisted
    // ========================================================================
    #[tokio::test]
    async fn test_wrong_count_is_validation_error() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_wrong_count_is_validation_error: DB unavailable");
                return;
            }
        };

        let marker = format!("six-{}", Uuid::new_v4());
        let recs: Vec<_> = (0..6)
            .map(|i| json!({"category": "ui", "title": format!("t{}", i), "impact": "low", "confidence": "low"}))
            .collect();
        let text = json!({"summary": marker, "recommendations": recs}).to_string();
        let svc = services(pool.clone(), Some(Arc::new(ScriptedGateway::new(vec![Ok(text)]))));

        let err = run_analysis(&svc, input()).await.unwrap_err();
        assert!(matches!(err, CritiqueError::Validation(_)));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analyses WHERE summary = $1")
            .bind(&marker)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    // ========================================================================
    // TEST 3: model failure → failed analysis row, upstream error
    // ========================================================================
    #[tokio::test]
    async fn test_upstream_failure_records_failed_row() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_upstream_failure_records_failed_row: DB unavailable");
                return;
            }
        };

        let url = format!("https://fail-{}.example", Uuid::new_v4());
        let gateway = ScriptedGateway::new(vec![Err(GatewayError::AllModelsFailed {
            attempts: vec!["m1: 503".into()],
        })]);
        let svc = services(pool.clone(), Some(Arc::new(gateway)));

        let mut req = input();
        req.url = Some(url.clone());
        let err = run_analysis(&svc, req).await.unwrap_err();
        assert!(err.is_upstream());

        let (status, error): (String, Option<String>) =
            sqlx::query_as("SELECT status, error FROM analyses WHERE url = $1")
                .bind(&url)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, AnalysisStatus::Failed.as_str());
        assert!(error.unwrap().contains("m1: 503"));
    }

    #[tokio::test]
    async fn test_upstream_error_survives_failed_audit_write() {
        let gateway = ScriptedGateway::new(vec![Err(GatewayError::AllModelsFailed {
            attempts: vec!["m1: 503".into()],
        })]);
        let svc = services(unreachable_pool(), Some(Arc::new(gateway)));

        let err = run_analysis(&svc, input()).await.unwrap_err();
        assert!(err.is_upstream(), "got {:?}", err);
        assert!(err.to_string().contains("m1: 503"));
    }

    // ========================================================================
    // TEST 4: no gateway → configuration error before any write
    // ========================================================================
    #[tokio::test]
    async fn test_missing_gateway_is_configuration_error() {
        // Fails before touching the database.
        let pool = PgPool::connect_lazy(DATABASE_URL).unwrap();

        let svc = services(pool, None);
        let err = run_analysis(&svc, input()).await.unwrap_err();
        assert!(matches!(err, CritiqueError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_empty_request_is_bad_request() {
        // Fails before touching the database.
        let pool = PgPool::connect_lazy(DATABASE_URL).unwrap();

        let svc = services(pool, None);
        let err = run_analysis(&svc, AnalyzeInput::default()).await.unwrap_err();
        assert!(matches!(err, CritiqueError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_load_payload_unknown_analysis_is_empty() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_load_payload_unknown_analysis_is_empty: DB unavailable");
                return;
            }
        };

        let store = RecommendationStore::new(pool);
        let payload = load_payload(&store, Uuid::new_v4()).await.unwrap();
        assert!(payload.recommendations.is_empty());
        assert!(payload.recommendations_all.is_empty());
        assert_eq!(payload.summary, "");
    }
}
