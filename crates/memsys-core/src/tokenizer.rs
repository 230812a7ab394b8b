//! Text utilities shared by the compressor and retriever: tokenization,
//! keyword normalization, and token-count estimation.

use regex::Regex;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s']").unwrap());
static APOSTROPHE_TRIM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^'+|'+$").unwrap());

/// Tokenize text into lowercase words.
/// Preserves apostrophes within words (e.g., "don't").
/// No stemming, no stop-word removal.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned = NON_WORD.replace_all(text, " ");
    cleaned
        .to_lowercase()
        .split_whitespace()
        .map(|t| APOSTROPHE_TRIM.replace_all(t, "").to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Estimate the token cost of a piece of text.
///
/// The chosen estimator is whitespace-word-count * 1.3 — a cheap proxy that
/// needs no model-specific tokenizer. This function is the single point
/// used throughout the crate, so budget math stays self-consistent even
/// though it doesn't match any particular provider's real tokenizer.
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    ((words as f64) * 1.3).ceil() as u32
}

/// Lowercase, strip punctuation, deduplicate (stable order), cap at `max`.
pub fn normalize_keywords(raw: &[String], max: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for kw in raw {
        let cleaned = NON_WORD.replace_all(kw, "").to_lowercase();
        let cleaned = cleaned.trim().to_string();
        if cleaned.is_empty() || seen.contains(&cleaned) {
            continue;
        }
        seen.insert(cleaned.clone());
        out.push(cleaned);
        if out.len() >= max {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenize() {
        let tokens = tokenize("Hello, world!");
        assert_eq!(tokens, vec!["hello", "world"]);
    }

    #[test]
    fn test_apostrophe_preserved() {
        let tokens = tokenize("Don't stop!");
        assert_eq!(tokens, vec!["don't", "stop"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_estimate_tokens_proxy() {
        // 4 words * 1.3 = 5.2 -> ceil 6
        assert_eq!(estimate_tokens("one two three four"), 6);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_normalize_keywords_dedup_and_lowercase() {
        let raw = vec!["Rust".to_string(), "rust".to_string(), "Async!".to_string()];
        let out = normalize_keywords(&raw, 32);
        assert_eq!(out, vec!["rust", "async"]);
    }

    #[test]
    fn test_normalize_keywords_cap() {
        let raw: Vec<String> = (0..40).map(|i| format!("kw{i}")).collect();
        let out = normalize_keywords(&raw, 32);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_normalize_keywords_drops_empty() {
        let raw = vec!["".to_string(), "!!!".to_string(), "ok".to_string()];
        let out = normalize_keywords(&raw, 32);
        assert_eq!(out, vec!["ok"]);
    }

    proptest::proptest! {
        #[test]
        fn prop_normalize_keywords_never_exceeds_cap(raw in proptest::collection::vec(".*", 0..64), max in 0usize..32) {
            let out = normalize_keywords(&raw, max);
            prop_assert!(out.len() <= max);
        }

        #[test]
        fn prop_estimate_tokens_monotonic_in_word_count(words in 0usize..200) {
            let short = vec!["w"; words].join(" ");
            let long = vec!["w"; words + 1].join(" ");
            prop_assert!(estimate_tokens(&short) <= estimate_tokens(&long));
        }
    }
}
