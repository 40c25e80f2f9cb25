//! Parser for candidate lists returned by the LLM.
//!
//! Parsing strategy:
//! 1. Strip `<think>` blocks and markdown code fences.
//! 2. Try `serde_json::from_str` on the remaining text, as a bare array or
//!    an object wrapping one (`{"items": [...]}` / `{"candidates": [...]}`).
//! 3. If that fails, extract the first `[…]` or `{…}` substring and retry.
//! 4. If nothing parses, return `None` so the caller can fall back.
//!
//! Individual malformed entries are skipped rather than failing the batch.

use crate::pool::CandidateItem;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think regex"))
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence regex"))
}

/// Parse an LLM response into candidates. `None` means the response was
/// not usable at all; `Some(vec![])` means the model found nothing.
pub fn parse_candidates(response: &str) -> Option<Vec<CandidateItem>> {
    let without_think = think_re().replace_all(response, "");
    let text = match fence_re().captures(&without_think) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        None => without_think.to_string(),
    };
    let text = text.trim();

    if let Some(candidates) = try_json(text) {
        return Some(candidates);
    }
    if let Some(fragment) = extract_json_fragment(text) {
        if let Some(candidates) = try_json(fragment) {
            return Some(candidates);
        }
    }

    let preview: String = text.chars().take(120).collect();
    debug!("Unparseable extraction response: {}", preview);
    None
}

fn try_json(text: &str) -> Option<Vec<CandidateItem>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => {
            let key = ["items", "candidates", "entities"]
                .into_iter()
                .find(|key| map.get(*key).is_some_and(Value::is_array))?;
            match map.remove(key) {
                Some(Value::Array(entries)) => entries,
                _ => return None,
            }
        }
        _ => return None,
    };

    Some(
        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<CandidateItem>(entry).ok())
            .filter(CandidateItem::is_valid)
            .map(|mut candidate| {
                candidate.priority = candidate.priority.map(crate::pool::score::clamp01);
                candidate
            })
            .collect(),
    )
}

/// First balanced-looking JSON array or object in `text`.
fn extract_json_fragment(text: &str) -> Option<&str> {
    let array = text.find('[').zip(text.rfind(']')).filter(|(s, e)| s < e);
    let object = text.find('{').zip(text.rfind('}')).filter(|(s, e)| s < e);

    let (start, end) = match (array, object) {
        (Some(a), Some(o)) => {
            if a.0 < o.0 {
                a
            } else {
                o
            }
        }
        (Some(a), None) => a,
        (None, Some(o)) => o,
        (None, None) => return None,
    };
    Some(&text[start..=end])
}
