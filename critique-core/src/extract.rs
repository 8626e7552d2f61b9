//! Tolerant JSON extraction from free-text model output.
//!
//! Models are asked for pure JSON but routinely wrap it in prose or Markdown
//! fences, leave trailing commas, or emit typographic quotes. `extract_json`
//! tries a fixed sequence of candidate substrings and returns the first one
//! that parses as a JSON object. It never panics and never returns a guess.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("valid fence regex")
    })
}

fn greedy_brace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid brace regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid comma regex"))
}

/// Extract the first well-formed JSON object from `text`.
///
/// Candidates, in order:
/// 1. contents of the first fenced code block (optionally tagged `json`)
/// 2. the greedy `{...}` span across the whole text
/// 3. the substring from the first `{` to the last `}`
/// 4. everything from the first line that begins with `{`
pub fn extract_json(text: &str) -> Option<Value> {
    candidates(text)
        .into_iter()
        .find_map(|candidate| parse_candidate(&candidate))
}

fn candidates(text: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(4);

    if let Some(inner) = fence_re().captures(text).and_then(|c| c.get(1)) {
        out.push(inner.as_str().to_string());
    }

    if let Some(m) = greedy_brace_re().find(text) {
        out.push(m.as_str().to_string());
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            out.push(text[start..=end].to_string());
        }
    }

    let lines: Vec<&str> = text.lines().collect();
    if let Some(first) = lines.iter().position(|l| l.trim_start().starts_with('{')) {
        out.push(lines[first..].join("\n"));
    }

    out
}

fn parse_candidate(raw: &str) -> Option<Value> {
    let cleaned = clean(raw);
    parse_object(&cleaned).or_else(|| {
        // Curly quotes inside string values are legitimate; retry without
        // normalizing them.
        let trimmed = strip_trailing_commas(raw.trim());
        parse_object(trimmed.trim())
    })
}

fn parse_object(s: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(s) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// Strip trailing commas, normalize smart quotes, trim.
pub fn clean(candidate: &str) -> String {
    let stripped = strip_trailing_commas(candidate);
    normalize_quotes(&stripped).trim().to_string()
}

fn strip_trailing_commas(s: &str) -> String {
    trailing_comma_re().replace_all(s, "$1").into_owned()
}

fn normalize_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect()
}
