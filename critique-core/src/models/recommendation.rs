use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Category {
    Ui,
    Ux,
    Product,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ui => "ui",
            Category::Ux => "ux",
            Category::Product => "product",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ui" => Ok(Category::Ui),
            "ux" => Ok(Category::Ux),
            "product" => Ok(Category::Product),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared scale for impact and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Level::High),
            "medium" => Ok(Level::Medium),
            "low" => Ok(Level::Low),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted recommendation in its client wire shape.
///
/// `active` and `position` are store-side state and never leave the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "id")]
    pub key: String,
    pub category: Category,
    pub title: String,
    pub impact: Level,
    pub confidence: Level,
    pub why_it_matters: String,
    pub what_to_change: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub analytics: Vec<String>,
    pub anchors: Vec<String>,
    pub votes: u32,
    #[serde(skip)]
    pub active: bool,
    #[serde(skip)]
    pub position: i32,
}

/// A recommendation as returned by the model, before it has a stable key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendationDraft {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub category: Category,
    pub title: String,
    pub impact: Level,
    pub confidence: Level,
    #[serde(default)]
    pub why_it_matters: String,
    #[serde(default, deserialize_with = "string_list")]
    pub what_to_change: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub analytics: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub anchors: Vec<String>,
}

impl RecommendationDraft {
    /// Materialize a fresh, active row with zero votes.
    pub fn into_recommendation(self, key: String, position: i32) -> Recommendation {
        Recommendation {
            key,
            category: self.category,
            title: self.title,
            impact: self.impact,
            confidence: self.confidence,
            why_it_matters: self.why_it_matters,
            what_to_change: self.what_to_change,
            acceptance_criteria: self.acceptance_criteria,
            analytics: self.analytics,
            anchors: self.anchors,
            votes: 0,
            active: true,
            position,
        }
    }
}

// Models emit ids as strings, numbers, or null.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// A bare string is accepted as a one-element list; null as empty.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levels_parse_case_insensitively() {
        assert_eq!("HIGH".parse::<Level>().unwrap(), Level::High);
        assert_eq!(" Medium ".parse::<Level>().unwrap(), Level::Medium);
        assert!("critical".parse::<Level>().is_err());
    }

    #[test]
    fn test_draft_accepts_loose_model_fields() {
        let draft: RecommendationDraft = serde_json::from_value(json!({
            "id": 4,
            "category": "UX",
            "title": "Shorten checkout",
            "impact": "High",
            "confidence": "low",
            "what_to_change": "Remove the coupon field",
            "analytics": null
        }))
        .unwrap();

        assert_eq!(draft.id.as_deref(), Some("4"));
        assert_eq!(draft.category, Category::Ux);
        assert_eq!(draft.what_to_change, vec!["Remove the coupon field"]);
        assert!(draft.analytics.is_empty());
        assert!(draft.why_it_matters.is_empty());
    }

    #[test]
    fn test_draft_rejects_unknown_category() {
        let result: Result<RecommendationDraft, _> = serde_json::from_value(json!({
            "category": "marketing",
            "title": "x",
            "impact": "high",
            "confidence": "high"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_wire_shape_hides_store_state() {
        let draft: RecommendationDraft = serde_json::from_value(json!({
            "category": "ui",
            "title": "Raise contrast on the primary CTA",
            "impact": "medium",
            "confidence": "high"
        }))
        .unwrap();
        let rec = draft.into_recommendation("rec-1".to_string(), 0);
        let wire = serde_json::to_value(&rec).unwrap();

        assert_eq!(wire["id"], "rec-1");
        assert_eq!(wire["category"], "ui");
        assert_eq!(wire["votes"], 0);
        assert!(wire.get("active").is_none());
        assert!(wire.get("position").is_none());
        assert!(wire["anchors"].is_array());
    }
}
