//! Label similarity used for merge-vs-insert decisions.
//!
//! Matching is lexical: exact label, alias membership, then token Jaccard.
//! Items of different kinds never match.

use super::item::ItemKind;
use std::collections::{BTreeSet, HashSet};

/// Case-folded tokens of a label. Splits on anything that is not
/// alphanumeric; CJK ideographs become one token each.
pub fn tokens(label: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();

    for ch in label.chars() {
        if is_cjk(ch) {
            if !word.is_empty() {
                out.insert(std::mem::take(&mut word));
            }
            out.insert(ch.to_string());
        } else if ch.is_alphanumeric() {
            word.extend(ch.to_lowercase());
        } else if !word.is_empty() {
            out.insert(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        out.insert(word);
    }
    out
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FA1F)
}

/// `|A ∩ B| / |A ∪ B|` over label tokens. Two empty labels score 0.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

fn same_label(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Borrowed view of anything with a kind, label and aliases.
#[derive(Debug, Clone, Copy)]
pub struct LabelRef<'a> {
    pub kind: &'a ItemKind,
    pub label: &'a str,
    pub aliases: &'a BTreeSet<String>,
}

/// Decides whether two labels name the same thing
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    threshold: f64,
}

impl SimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Similarity in `[0, 1]`: 1.0 for exact or alias matches, token
    /// Jaccard otherwise, 0.0 across kinds.
    pub fn similarity(&self, a: LabelRef<'_>, b: LabelRef<'_>) -> f64 {
        if a.kind != b.kind {
            return 0.0;
        }
        if same_label(a.label, b.label) {
            return 1.0;
        }
        let in_aliases = |label: &str, aliases: &BTreeSet<String>| {
            aliases.iter().any(|alias| same_label(alias, label))
        };
        if in_aliases(b.label, a.aliases) || in_aliases(a.label, b.aliases) {
            return 1.0;
        }
        jaccard(a.label, b.label)
    }

    pub fn similar(&self, a: LabelRef<'_>, b: LabelRef<'_>) -> bool {
        a.kind == b.kind && self.similarity(a, b) >= self.threshold
    }
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new(0.7)
    }
}
