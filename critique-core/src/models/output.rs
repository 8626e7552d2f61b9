use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::error::CritiqueError;
use crate::extract::extract_json;
use crate::models::recommendation::RecommendationDraft;

/// Every fresh analysis must carry exactly this many recommendations.
pub const RECOMMENDATION_COUNT: usize = 7;

/// Parsed analysis-level model response.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelOutput {
    #[serde(default)]
    pub summary: String,
    pub recommendations: Vec<RecommendationDraft>,
}

/// A draft paired with the key it will be stored under.
#[derive(Debug, Clone)]
pub struct KeyedDraft {
    pub key: String,
    pub draft: RecommendationDraft,
}

impl ModelOutput {
    /// Extract, deserialize and validate raw model text.
    ///
    /// Fails with `Validation` when no JSON object can be extracted, when the
    /// object does not have the expected shape, or when the recommendation
    /// count is not exactly [`RECOMMENDATION_COUNT`].
    pub fn from_model_text(text: &str) -> Result<Self, CritiqueError> {
        let value = extract_json(text).ok_or_else(|| {
            CritiqueError::Validation("model output contained no parseable JSON object".into())
        })?;
        let output: ModelOutput = serde_json::from_value(value).map_err(|e| {
            CritiqueError::Validation(format!("model output has unexpected shape: {}", e))
        })?;
        output.validate()?;
        Ok(output)
    }

    pub fn validate(&self) -> Result<(), CritiqueError> {
        if self.recommendations.len() != RECOMMENDATION_COUNT {
            return Err(CritiqueError::Validation(format!(
                "expected exactly {} recommendations, got {}",
                RECOMMENDATION_COUNT,
                self.recommendations.len()
            )));
        }
        if let Some(i) = self
            .recommendations
            .iter()
            .position(|r| r.title.trim().is_empty())
        {
            return Err(CritiqueError::Validation(format!(
                "recommendation {} has an empty title",
                i + 1
            )));
        }
        Ok(())
    }

    /// Assign each draft a key unique within the analysis.
    ///
    /// The model's `id` is kept when present and unused; otherwise `rec-N`
    /// (1-based position) is synthesized.
    pub fn keyed(self) -> Vec<KeyedDraft> {
        let mut used = HashSet::new();
        self.recommendations
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                let preferred = draft.id.clone();
                let key = unique_key(preferred.as_deref(), i + 1, &mut used);
                KeyedDraft { key, draft }
            })
            .collect()
    }
}

/// Pick a key not yet in `used` and reserve it.
pub fn unique_key(preferred: Option<&str>, ordinal: usize, used: &mut HashSet<String>) -> String {
    if let Some(p) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
        if used.insert(p.to_string()) {
            return p.to_string();
        }
    }
    let mut n = ordinal;
    loop {
        let candidate = format!("rec-{}", n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

impl RecommendationDraft {
    /// Parse a single-recommendation response.
    ///
    /// Accepts a bare recommendation object, `{"recommendation": {...}}`, or
    /// `{"recommendations": [...]}` (first entry).
    pub fn from_model_text(text: &str) -> Result<Self, CritiqueError> {
        let value = extract_json(text).ok_or_else(|| {
            CritiqueError::Validation("replacement output contained no parseable JSON object".into())
        })?;

        let candidate = match value {
            Value::Object(ref map) if map.contains_key("recommendation") => {
                map["recommendation"].clone()
            }
            Value::Object(ref map) if map.contains_key("recommendations") => map
                ["recommendations"]
                .as_array()
                .and_then(|a| a.first().cloned())
                .ok_or_else(|| {
                    CritiqueError::Validation("replacement list is empty".into())
                })?,
            other => other,
        };

        let draft: RecommendationDraft = serde_json::from_value(candidate).map_err(|e| {
            CritiqueError::Validation(format!("replacement has unexpected shape: {}", e))
        })?;
        if draft.title.trim().is_empty() {
            return Err(CritiqueError::Validation("replacement has an empty title".into()));
        }
        Ok(draft)
    }
}
