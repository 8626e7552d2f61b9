//! Recommendation store: analyses, their recommendations, and the
//! interaction audit log in PostgreSQL.
//!
//! Every mutation is a single statement or a single transaction; no
//! transaction ever spans a model call.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CritiqueError;
use crate::models::output::unique_key;
use crate::models::{
    Analysis, AnalysisStatus, Interaction, InteractionAction, ModelOutput, Recommendation,
    RecommendationDraft,
};

const RECOMMENDATION_COLUMNS: &str = "rec_key, position, category, title, impact, confidence, \
     why_it_matters, what_to_change, acceptance_criteria, analytics, anchors, votes, active";

#[derive(sqlx::FromRow)]
struct RecommendationRow {
    rec_key: String,
    position: i32,
    category: String,
    title: String,
    impact: String,
    confidence: String,
    why_it_matters: String,
    what_to_change: Json<Vec<String>>,
    acceptance_criteria: Json<Vec<String>>,
    analytics: Json<Vec<String>>,
    anchors: Json<Vec<String>>,
    votes: i32,
    active: bool,
}

fn decode_err(msg: String) -> CritiqueError {
    CritiqueError::Database(sqlx::Error::Decode(msg.into()))
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = CritiqueError;

    fn try_from(row: RecommendationRow) -> Result<Self, Self::Error> {
        Ok(Recommendation {
            key: row.rec_key,
            category: row.category.parse().map_err(decode_err)?,
            title: row.title,
            impact: row.impact.parse().map_err(decode_err)?,
            confidence: row.confidence.parse().map_err(decode_err)?,
            why_it_matters: row.why_it_matters,
            what_to_change: row.what_to_change.0,
            acceptance_criteria: row.acceptance_criteria.0,
            analytics: row.analytics.0,
            anchors: row.anchors.0,
            votes: u32::try_from(row.votes).unwrap_or(0),
            active: row.active,
            position: row.position,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: Uuid,
    url: Option<String>,
    screenshot_refs: Json<Vec<String>>,
    context: Value,
    summary: String,
    raw_output: Option<String>,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AnalysisRow> for Analysis {
    type Error = CritiqueError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        let status = AnalysisStatus::parse(&row.status)
            .ok_or_else(|| decode_err(format!("unknown analysis status '{}'", row.status)))?;
        Ok(Analysis {
            id: row.id,
            url: row.url,
            screenshot_refs: row.screenshot_refs.0,
            context: row.context,
            summary: row.summary,
            raw_output: row.raw_output,
            status,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecommendationStore {
    pool: PgPool,
}

impl RecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Persist a validated model result as a `completed` analysis plus its
    /// recommendations, in one transaction. Returns the new analysis id.
    pub async fn create_analysis(
        &self,
        output: ModelOutput,
        url: Option<&str>,
        screenshot_refs: &[String],
        context: &Value,
        raw_output: &str,
    ) -> Result<Uuid, CritiqueError> {
        output.validate()?;

        let id = Uuid::new_v4();
        let summary = output.summary.clone();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO analyses (id, url, screenshot_refs, context, summary, raw_output, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(url)
        .bind(Json(screenshot_refs))
        .bind(context)
        .bind(&summary)
        .bind(raw_output)
        .bind(AnalysisStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        for (position, keyed) in output.keyed().into_iter().enumerate() {
            let rec = keyed.draft.into_recommendation(keyed.key, position as i32);
            insert_recommendation(&mut tx, id, &rec).await?;
        }

        tx.commit().await?;

        tracing::info!(analysis_id = %id, "Stored analysis with recommendations");
        Ok(id)
    }

    /// Record an upstream failure as a `failed` analysis row.
    pub async fn record_failed_analysis(
        &self,
        url: Option<&str>,
        screenshot_refs: &[String],
        context: &Value,
        error: &str,
    ) -> Result<Uuid, CritiqueError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO analyses (id, url, screenshot_refs, context, status, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(url)
        .bind(Json(screenshot_refs))
        .bind(context)
        .bind(AnalysisStatus::Failed.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        tracing::warn!(analysis_id = %id, error = %error, "Recorded failed analysis");
        Ok(id)
    }

    pub async fn get_analysis(&self, analysis_id: Uuid) -> Result<Option<Analysis>, CritiqueError> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, url, screenshot_refs, context, summary, raw_output, status, error, created_at
            FROM analyses WHERE id = $1
            "#,
        )
        .bind(analysis_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Analysis::try_from).transpose()
    }

    /// Increment the vote count by one, regardless of active state.
    ///
    /// Returns the new count, or `None` when no row matches. Never creates
    /// a recommendation.
    pub async fn upvote(&self, analysis_id: Uuid, key: &str) -> Result<Option<u32>, CritiqueError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE recommendations SET votes = votes + 1
            WHERE analysis_id = $1 AND rec_key = $2
            RETURNING votes
            "#,
        )
        .bind(analysis_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(v,)| u32::try_from(v).unwrap_or(0)))
    }

    /// Deactivate an active recommendation.
    ///
    /// Returns the row as it was deactivated, or `None` if nothing changed
    /// (unknown key or already inactive).
    pub async fn downvote(
        &self,
        analysis_id: Uuid,
        key: &str,
    ) -> Result<Option<Recommendation>, CritiqueError> {
        let sql = format!(
            "UPDATE recommendations SET active = FALSE \
             WHERE analysis_id = $1 AND rec_key = $2 AND active \
             RETURNING {}",
            RECOMMENDATION_COLUMNS
        );
        let row: Option<RecommendationRow> = sqlx::query_as(&sql)
            .bind(analysis_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Recommendation::try_from).transpose()
    }

    /// Active recommendations in insertion order.
    pub async fn list_active(&self, analysis_id: Uuid) -> Result<Vec<Recommendation>, CritiqueError> {
        let sql = format!(
            "SELECT {} FROM recommendations WHERE analysis_id = $1 AND active ORDER BY position",
            RECOMMENDATION_COLUMNS
        );
        self.fetch_recommendations(&sql, analysis_id).await
    }

    /// All recommendations, including inactive ones, in insertion order.
    pub async fn list_recommendations(
        &self,
        analysis_id: Uuid,
    ) -> Result<Vec<Recommendation>, CritiqueError> {
        let sql = format!(
            "SELECT {} FROM recommendations WHERE analysis_id = $1 ORDER BY position",
            RECOMMENDATION_COLUMNS
        );
        self.fetch_recommendations(&sql, analysis_id).await
    }

    async fn fetch_recommendations(
        &self,
        sql: &str,
        analysis_id: Uuid,
    ) -> Result<Vec<Recommendation>, CritiqueError> {
        let rows: Vec<RecommendationRow> = sqlx::query_as(sql)
            .bind(analysis_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Recommendation::try_from).collect()
    }

    /// Append one active recommendation at the next position.
    ///
    /// The analysis row is locked for the duration so concurrent replacements
    /// for the same analysis serialize.
    pub async fn insert_replacement(
        &self,
        analysis_id: Uuid,
        draft: RecommendationDraft,
    ) -> Result<Recommendation, CritiqueError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM analyses WHERE id = $1 FOR UPDATE")
                .bind(analysis_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(CritiqueError::NotFound(format!("analysis {}", analysis_id)));
        }

        let existing: Vec<(String, i32)> =
            sqlx::query_as("SELECT rec_key, position FROM recommendations WHERE analysis_id = $1")
                .bind(analysis_id)
                .fetch_all(&mut *tx)
                .await?;

        let next_position = existing.iter().map(|(_, p)| *p).max().map_or(0, |p| p + 1);
        let mut used: HashSet<String> = existing.into_iter().map(|(k, _)| k).collect();
        let key = unique_key(draft.id.as_deref(), next_position as usize + 1, &mut used);

        let rec = draft.into_recommendation(key, next_position);
        insert_recommendation(&mut tx, analysis_id, &rec).await?;
        tx.commit().await?;

        tracing::info!(analysis_id = %analysis_id, rec_key = %rec.key, "Inserted replacement recommendation");
        Ok(rec)
    }

    /// Append an audit row.
    pub async fn log_interaction(
        &self,
        analysis_id: Uuid,
        key: &str,
        action: InteractionAction,
        payload: Option<&Value>,
    ) -> Result<(), CritiqueError> {
        sqlx::query(
            r#"
            INSERT INTO interactions (analysis_id, rec_key, action, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(analysis_id)
        .bind(key)
        .bind(action.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_interactions(&self, analysis_id: Uuid) -> Result<Vec<Interaction>, CritiqueError> {
        let rows = sqlx::query_as::<_, Interaction>(
            r#"
            SELECT id, analysis_id, rec_key, action, payload, created_at
            FROM interactions WHERE analysis_id = $1 ORDER BY id
            "#,
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn insert_recommendation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    analysis_id: Uuid,
    rec: &Recommendation,
) -> Result<(), CritiqueError> {
    sqlx::query(
        r#"
        INSERT INTO recommendations (
            analysis_id, rec_key, position, category, title, impact, confidence,
            why_it_matters, what_to_change, acceptance_criteria, analytics, anchors,
            votes, active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, TRUE)
        "#,
    )
    .bind(analysis_id)
    .bind(&rec.key)
    .bind(rec.position)
    .bind(rec.category.as_str())
    .bind(&rec.title)
    .bind(rec.impact.as_str())
    .bind(rec.confidence.as_str())
    .bind(&rec.why_it_matters)
    .bind(Json(&rec.what_to_change))
    .bind(Json(&rec.acceptance_criteria))
    .bind(Json(&rec.analytics))
    .bind(Json(&rec.anchors))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
