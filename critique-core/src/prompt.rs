//! Prompt builder: renders the instruction text sent to the model.
//!
//! Pure and deterministic: the same context and prefix always produce the
//! same bytes. Context keys are rendered in sorted order.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::RECOMMENDATION_COUNT;

const SCHEMA: &str = r#"{
  "summary": string,                    // 1-2 sentences on the page's biggest opportunity
  "recommendations": [                  // exactly {COUNT} entries
    {
      "id": string,                     // short, stable slug, unique in this list
      "category": "ui" | "ux" | "product",
      "title": string,                  // imperative, under 80 characters
      "impact": "high" | "medium" | "low",
      "confidence": "high" | "medium" | "low",
      "why_it_matters": string,         // one paragraph tied to the stated goal
      "what_to_change": [string],       // 1-4 concrete edits
      "acceptance_criteria": [string],  // 1-3 checkable outcomes
      "analytics": [string],            // 1-3 events or metrics to watch
      "anchors": [string]               // visible labels or regions in the screenshot
    }
  ]
}"#;

const RECOMMENDATION_SCHEMA: &str = r#"{
  "id": string,
  "category": "ui" | "ux" | "product",
  "title": string,
  "impact": "high" | "medium" | "low",
  "confidence": "high" | "medium" | "low",
  "why_it_matters": string,
  "what_to_change": [string],
  "acceptance_criteria": [string],
  "analytics": [string],
  "anchors": [string]
}"#;

const RANKING_RULE: &str = "\
Rank the recommendations before returning them:
  score = impactWeight(impact) + confidenceWeight(confidence)
  impactWeight: high = 3, medium = 2, low = 1
  confidenceWeight: high = 0.3, medium = 0.2, low = 0.1
Sort by score, highest first.";

const EXAMPLES: &str = "\
Good: \"Replace the 'Learn more' hero button with 'Start free trial' and move it above the fold; \
the current CTA sits below 900px on desktop.\"
Good: \"Collapse the 14-field signup form to email + password and defer profile fields to onboarding.\"
Bad: \"Improve the design.\" (not specific, no anchor, not testable)
Bad: \"Make the site faster.\" (no change named, nothing visible in the screenshot)";

fn render_context(context: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = context.iter().collect();
    if sorted.is_empty() {
        return "{}".to_string();
    }
    serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| "{}".to_string())
}

fn push_prefix(out: &mut String, prefix: Option<&str>) {
    if let Some(p) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
        out.push_str(p);
        out.push_str("\n\n");
    }
}

/// Build the full-analysis prompt.
pub fn build_analysis_prompt(context: &Map<String, Value>, prefix: Option<&str>) -> String {
    let mut out = String::new();
    push_prefix(&mut out, prefix);

    out.push_str(
        "You are a senior product designer reviewing a screenshot of a web page. \
         Produce specific, testable design recommendations grounded in what is visible.\n\n",
    );

    out.push_str("CONTEXT\n");
    out.push_str(&render_context(context));
    out.push_str("\n\n");

    out.push_str("OUTPUT FORMAT\n");
    out.push_str("Respond with a single JSON object and nothing else. No prose, no Markdown fences.\n");
    out.push_str(&SCHEMA.replace("{COUNT}", &RECOMMENDATION_COUNT.to_string()));
    out.push_str("\n\n");

    out.push_str("HARD CONSTRAINTS\n");
    out.push_str(&format!(
        "- The \"recommendations\" array MUST contain exactly {} entries. Not {}, not {}.\n",
        RECOMMENDATION_COUNT,
        RECOMMENDATION_COUNT - 1,
        RECOMMENDATION_COUNT + 1
    ));
    out.push_str("- Every field is required. Lists must be JSON arrays of strings, never a single string.\n");
    out.push_str("- Use only the enum values shown for category, impact and confidence.\n\n");

    out.push_str("PRIORITY\n");
    out.push_str(RANKING_RULE);
    out.push_str("\n\n");

    out.push_str("EXAMPLES\n");
    out.push_str(EXAMPLES);
    out.push('\n');

    out
}

/// Build the single-recommendation prompt used to replace a downvoted item.
pub fn build_replacement_prompt(
    context: &Map<String, Value>,
    prefix: Option<&str>,
    existing_titles: &[String],
    rejected_title: Option<&str>,
) -> String {
    let mut out = String::new();
    push_prefix(&mut out, prefix);

    out.push_str(
        "You are a senior product designer reviewing a screenshot of a web page. \
         Suggest ONE new design recommendation.\n\n",
    );

    out.push_str("CONTEXT\n");
    out.push_str(&render_context(context));
    out.push_str("\n\n");

    if let Some(rejected) = rejected_title {
        out.push_str("The user rejected this recommendation; do not suggest anything similar:\n");
        out.push_str(&format!("- {}\n\n", rejected));
    }

    if !existing_titles.is_empty() {
        out.push_str("These recommendations are already shown; do not overlap with any of them:\n");
        for title in existing_titles {
            out.push_str(&format!("- {}\n", title));
        }
        out.push('\n');
    }

    out.push_str("OUTPUT FORMAT\n");
    out.push_str("Respond with a single JSON object describing one recommendation and nothing else.\n");
    out.push_str(RECOMMENDATION_SCHEMA);
    out.push_str("\n\n");

    out.push_str("EXAMPLES\n");
    out.push_str(EXAMPLES);
    out.push('\n');

    out
}
