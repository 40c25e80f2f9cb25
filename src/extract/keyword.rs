//! Keyword extractor - the degraded fallback when the LLM is unavailable.
//!
//! Pure regex over the turn text. Finds quoted phrases and hashtags
//! (topics), capitalized names and 小X/老X nicknames (entities), mixed
//! Latin/CJK technical terms (topics), and event keywords in English and
//! Chinese.

use super::{CandidateExtractor, Turn};
use crate::pool::{CandidateItem, ItemKind};
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;

/// Default priority when the turn carries no known emotion
const DEFAULT_PRIORITY: f64 = 0.4;

/// Regex-based candidate extractor
pub struct KeywordExtractor {
    /// (pattern, kind) pairs; the first capture group (or whole match) is the label
    patterns: Vec<(Regex, ItemKind)>,
    stopwords: HashSet<&'static str>,
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self {
            patterns: Self::compile_patterns(),
            stopwords: [
                "I", "The", "A", "An", "It", "We", "You", "He", "She", "They", "This", "That",
                "My", "Our", "Your", "Hi", "Hello", "Yes", "No", "OK", "Ok", "Thanks",
            ]
            .into_iter()
            .collect(),
        }
    }

    fn compile_patterns() -> Vec<(Regex, ItemKind)> {
        vec![
            (Regex::new(r#""([^"]{2,40})""#).unwrap(), ItemKind::Topic),
            (Regex::new(r"[“「『]([^”」』]{1,40})[”」』]").unwrap(), ItemKind::Topic),
            (Regex::new(r"#([\p{L}\p{N}_]{2,40})").unwrap(), ItemKind::Topic),
            (
                Regex::new(r"([A-Za-z][A-Za-z0-9+#.]*\p{Han}{2,8})").unwrap(),
                ItemKind::Topic,
            ),
            (
                Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap(),
                ItemKind::Entity,
            ),
            (Regex::new(r"\b([A-Z][a-z]{2,})\b").unwrap(), ItemKind::Entity),
            (Regex::new(r"((?:小|老)\p{Han})").unwrap(), ItemKind::Entity),
            (
                Regex::new(r"(?i)\b(meeting|deadline|appointment|interview|birthday|exam|trip|flight|party|wedding)\b")
                    .unwrap(),
                ItemKind::Event,
            ),
            (
                Regex::new(r"(会议|开会|面试|生日|出差|考试|约会|旅行|航班|婚礼|聚会|截止)").unwrap(),
                ItemKind::Event,
            ),
        ]
    }

    /// Extract candidates synchronously.
    pub fn extract_sync(&self, turn: &Turn) -> Vec<CandidateItem> {
        let text = turn.text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let priority = turn.emotion.map(crate::pool::score::clamp01).unwrap_or(DEFAULT_PRIORITY);
        let mut seen: HashSet<(ItemKind, String)> = HashSet::new();
        let mut candidates = Vec::new();

        for (pattern, kind) in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(label) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                let label = label.as_str().trim();
                if label.is_empty() || self.stopwords.contains(label) {
                    continue;
                }
                let key = (kind.clone(), label.to_lowercase());
                // a name already captured as part of a longer name is skipped
                let covered = *kind == ItemKind::Entity
                    && candidates.iter().any(|c: &CandidateItem| {
                        c.kind == ItemKind::Entity && c.label.split_whitespace().any(|w| w == label)
                    });
                if covered || !seen.insert(key) {
                    continue;
                }

                let mut candidate = CandidateItem::new(kind.clone(), label)
                    .with_priority(priority)
                    .with_metadata("extractor", serde_json::Value::String("keyword".to_string()));
                if let Some(intent) = &turn.intent {
                    candidate = candidate.with_metadata("intent", serde_json::Value::String(intent.clone()));
                }
                candidates.push(candidate);
            }
        }

        candidates
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateExtractor for KeywordExtractor {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn extract(&self, turn: &Turn) -> Result<Vec<CandidateItem>> {
        Ok(self.extract_sync(turn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(candidates: &[CandidateItem], kind: ItemKind) -> Vec<String> {
        candidates
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.label.clone())
            .collect()
    }

    #[test]
    fn test_extracts_names_and_events() {
        let extractor = KeywordExtractor::new();
        let turn = Turn::new("I have a meeting with Sarah Connor tomorrow about the #budget");
        let candidates = extractor.extract_sync(&turn);

        assert_eq!(labels(&candidates, ItemKind::Entity), vec!["Sarah Connor".to_string()]);
        assert_eq!(labels(&candidates, ItemKind::Event), vec!["meeting".to_string()]);
        assert_eq!(labels(&candidates, ItemKind::Topic), vec!["budget".to_string()]);
    }

    #[test]
    fn test_extracts_chinese_terms() {
        let extractor = KeywordExtractor::new();
        let turn = Turn::new("小张说明天要开会，讨论Flutter性能优化的问题");
        let candidates = extractor.extract_sync(&turn);

        assert!(labels(&candidates, ItemKind::Entity).contains(&"小张".to_string()));
        assert!(labels(&candidates, ItemKind::Event).contains(&"开会".to_string()));
        let topics = labels(&candidates, ItemKind::Topic);
        assert!(topics.iter().any(|t| t.starts_with("Flutter性能优化")), "{:?}", topics);
    }

    #[test]
    fn test_emotion_becomes_priority() {
        let extractor = KeywordExtractor::new();
        let turn = Turn::new("Worried about the interview").with_emotion(0.9).with_intent("vent");
        let candidates = extractor.extract_sync(&turn);
        let interview = candidates.iter().find(|c| c.label == "interview").unwrap();
        assert_eq!(interview.priority, Some(0.9));
        assert_eq!(interview.metadata["intent"], "vent");
    }

    #[test]
    fn test_blank_and_stopwords_yield_nothing() {
        let extractor = KeywordExtractor::new();
        assert!(extractor.extract_sync(&Turn::new("   ")).is_empty());
        assert!(extractor.extract_sync(&Turn::new("Thanks")).is_empty());
    }

    #[test]
    fn test_duplicates_collapsed() {
        let extractor = KeywordExtractor::new();
        let candidates = extractor.extract_sync(&Turn::new("deadline, Deadline, DEADLINE"));
        assert_eq!(labels(&candidates, ItemKind::Event).len(), 1);
    }
}
