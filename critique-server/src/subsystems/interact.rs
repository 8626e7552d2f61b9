//! Upvote / downvote handling.
//!
//! A recommendation is either active or inactive, and inactive is terminal.
//! Upvotes count in either state. A downvote deactivates the row; the slate
//! refills from the ranked backlog because the payload is always re-derived
//! from the active rows. With server replacement enabled, one fresh
//! recommendation is also requested from the model and appended.
//!
//! Unknown analyses and keys are soft no-ops: the caller still gets the
//! re-derived payload.

use critique_core::models::Analysis;
use critique_core::prompt::build_replacement_prompt;
use critique_core::{CritiqueError, InteractionAction, Recommendation, RecommendationDraft};
use serde_json::{json, Map};
use uuid::Uuid;

use super::analyze::{load_payload, media_for, AnalysisPayload};
use super::Services;

pub async fn apply_action(
    services: &Services,
    analysis_id: Uuid,
    key: &str,
    action: InteractionAction,
) -> Result<AnalysisPayload, CritiqueError> {
    let analysis = match services.store.get_analysis(analysis_id).await? {
        Some(a) => a,
        None => {
            tracing::debug!(analysis_id = %analysis_id, "Interaction on unknown analysis ignored");
            return load_payload(&services.store, analysis_id).await;
        }
    };

    let mut replacement_key = None;
    match action {
        InteractionAction::Upvote => match services.store.upvote(analysis_id, key).await? {
            Some(votes) => tracing::info!(analysis_id = %analysis_id, rec_key = %key, votes, "Upvoted"),
            None => tracing::debug!(analysis_id = %analysis_id, rec_key = %key, "Upvote matched nothing"),
        },
        InteractionAction::Downvote => {
            if let Some(rejected) = services.store.downvote(analysis_id, key).await? {
                tracing::info!(analysis_id = %analysis_id, rec_key = %key, "Downvoted");
                if services.server_replacement {
                    match fetch_replacement(services, &analysis, &rejected).await {
                        Ok(rec) => replacement_key = Some(rec.key),
                        Err(e) => tracing::warn!(
                            analysis_id = %analysis_id,
                            error = %e,
                            "Replacement failed; downvote kept"
                        ),
                    }
                }
            }
        }
    }

    let payload = json!({ "replacement": replacement_key });
    if let Err(e) = services
        .store
        .log_interaction(analysis_id, key, action, Some(&payload))
        .await
    {
        tracing::warn!(analysis_id = %analysis_id, error = %e, "Failed to log interaction");
    }

    load_payload(&services.store, analysis_id).await
}

/// Ask the model for one recommendation that does not overlap the ones
/// still on screen, and append it.
async fn fetch_replacement(
    services: &Services,
    analysis: &Analysis,
    rejected: &Recommendation,
) -> Result<Recommendation, CritiqueError> {
    let gateway = services.gateway()?;

    let context = analysis.context.as_object().cloned().unwrap_or_else(Map::new);
    let existing_titles: Vec<String> = services
        .store
        .list_active(analysis.id)
        .await?
        .into_iter()
        .map(|r| r.title)
        .collect();

    let prompt = build_replacement_prompt(
        &context,
        services.prompt_prefix.as_deref(),
        &existing_titles,
        Some(&rejected.title),
    );
    let media = media_for(services.objects.as_ref(), &analysis.screenshot_refs)?;

    let text = gateway.generate(&prompt, &media).await?;
    let draft = RecommendationDraft::from_model_text(&text)?;
    let rec = services.store.insert_replacement(analysis.id, draft).await?;

    tracing::info!(analysis_id = %analysis.id, rec_key = %rec.key, "Replacement appended");
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::subsystems::analyze::{run_analysis, AnalyzeInput};
    use crate::subsystems::testing::{
        make_pool, services, seven_recommendations_text, single_recommendation_text,
        ScriptedGateway,
    };
    use critique_core::GatewayError;

    fn keys(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.key.as_str()).collect()
    }

    async fn seeded(svc: &Services) -> Uuid {
        let input = AnalyzeInput {
            url: Some("https://shop.example".into()),
            ..Default::default()
        };
        run_analysis(svc, input).await.unwrap().analysis_id
    }

    // ========================================================================
    // TEST 1: upvote increments by exactly 1 and leaves ranking alone
    // ========================================================================
    #[tokio::test]
    async fn test_upvote_does_not_reorder() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_upvote_does_not_reorder: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(seven_recommendations_text())]));
        let svc = services(pool, Some(gateway));
        let id = seeded(&svc).await;

        let payload = apply_action(&svc, id, "r7", InteractionAction::Upvote).await.unwrap();
        let r7 = payload.recommendations_all.iter().find(|r| r.key == "r7").unwrap();
        assert_eq!(r7.votes, 1);
        assert_eq!(keys(&payload.recommendations), vec!["r1", "r2", "r3"]);

        let log = svc.store.list_interactions(id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "upvote");
    }

    // ========================================================================
    // TEST 2: downvote without replacement refills the slate from backlog
    // ========================================================================
    #[tokio::test]
    async fn test_downvote_refills_slate_from_backlog() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_downvote_refills_slate_from_backlog: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(seven_recommendations_text())]));
        let mut svc = services(pool, Some(gateway.clone()));
        svc.server_replacement = false;
        let id = seeded(&svc).await;

        let payload = apply_action(&svc, id, "r1", InteractionAction::Downvote).await.unwrap();
        assert_eq!(keys(&payload.recommendations), vec!["r2", "r3", "r4"]);
        assert_eq!(payload.recommendations_all.len(), 6);
        assert_eq!(gateway.calls(), 1);
    }

    // ========================================================================
    // TEST 3: downvote with replacement appends a fresh active row
    // ========================================================================
    #[tokio::test]
    async fn test_downvote_fetches_replacement() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_downvote_fetches_replacement: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(seven_recommendations_text()),
            Ok(single_recommendation_text("Add a sticky buy button")),
        ]));
        let svc = services(pool, Some(gateway.clone()));
        let id = seeded(&svc).await;

        let payload = apply_action(&svc, id, "r2", InteractionAction::Downvote).await.unwrap();
        assert_eq!(payload.recommendations_all.len(), 7);
        let fresh = payload
            .recommendations_all
            .iter()
            .find(|r| r.title == "Add a sticky buy button")
            .expect("replacement should be active");
        assert_eq!(fresh.key, "fresh");
        assert_eq!(fresh.votes, 0);
        // high/high ties r1 at 3.3 but was inserted later.
        assert_eq!(keys(&payload.recommendations), vec!["r1", "fresh", "r3"]);

        let prompts = gateway.prompts.lock().unwrap();
        assert!(prompts[1].contains("Recommendation 2"));
        assert!(prompts[1].contains("Recommendation 3"));
    }

    // ========================================================================
    // TEST 4: replacement failure is swallowed; downvote still commits
    // ========================================================================
    #[tokio::test]
    async fn test_replacement_failure_keeps_downvote() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_replacement_failure_keeps_downvote: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(seven_recommendations_text()),
            Err(GatewayError::Api { code: 500, message: "boom".into() }),
        ]));
        let svc = services(pool, Some(gateway));
        let id = seeded(&svc).await;

        let payload = apply_action(&svc, id, "r1", InteractionAction::Downvote).await.unwrap();
        assert_eq!(payload.recommendations_all.len(), 6);
        assert!(payload.recommendations_all.iter().all(|r| r.key != "r1"));
    }

    // ========================================================================
    // TEST 5: repeated downvote is a no-op and issues no second model call
    // ========================================================================
    #[tokio::test]
    async fn test_downvote_idempotent() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_downvote_idempotent: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(seven_recommendations_text()),
            Ok(single_recommendation_text("One replacement")),
        ]));
        let svc = services(pool, Some(gateway.clone()));
        let id = seeded(&svc).await;

        let first = apply_action(&svc, id, "r4", InteractionAction::Downvote).await.unwrap();
        let second = apply_action(&svc, id, "r4", InteractionAction::Downvote).await.unwrap();
        assert_eq!(first.recommendations_all.len(), 7);
        assert_eq!(keys(&first.recommendations_all), keys(&second.recommendations_all));
        assert_eq!(gateway.calls(), 2);
    }

    // ========================================================================
    // TEST 6: unknown analysis and unknown key are soft no-ops
    // ========================================================================
    #[tokio::test]
    async fn test_unknown_targets_are_soft() {
        let pool = match make_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test_unknown_targets_are_soft: DB unavailable");
                return;
            }
        };

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(seven_recommendations_text())]));
        let svc = services(pool, Some(gateway));

        let empty = apply_action(&svc, Uuid::new_v4(), "r1", InteractionAction::Upvote)
            .await
            .unwrap();
        assert!(empty.recommendations.is_empty());

        let id = seeded(&svc).await;
        let payload = apply_action(&svc, id, "nope", InteractionAction::Downvote)
            .await
            .unwrap();
        assert_eq!(payload.recommendations_all.len(), 7);
        assert!(payload.recommendations_all.iter().all(|r| r.votes == 0));
    }
}
