//! Pluggable name and query normalization.
//!
//! The hypergraph compares concept names and query terms through a
//! [`TermNormalizer`]. Linguistic base-form reduction (lemmatization) lives
//! outside this crate; callers that have one plug it in behind this trait.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+").expect("invalid regex"));

/// English function words dropped from free-text queries.
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "am", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "being", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
    "has", "have", "he", "her", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "me", "my", "no", "not", "of", "on", "or", "our", "she", "so", "some", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "too", "up", "us",
    "very", "was", "we", "were", "what", "when", "where", "which", "who", "why", "will", "with",
    "would", "you", "your",
];

/// Maps names and query text onto comparison terms.
pub trait TermNormalizer: Send + Sync {
    /// Normalize a single name or term. Two names collide in the graph iff
    /// their normalized forms are equal.
    fn normalize(&self, text: &str) -> String;

    /// Split free text into the set of normalized terms it mentions.
    fn terms(&self, text: &str) -> HashSet<String> {
        text.split_whitespace()
            .map(|word| self.normalize(word))
            .filter(|term| !term.is_empty())
            .collect()
    }
}

/// Trims and lowercases. The default normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseNormalizer;

impl TermNormalizer for LowercaseNormalizer {
    fn normalize(&self, text: &str) -> String {
        text.trim().to_lowercase()
    }
}

/// Lowercasing normalizer whose query tokenizer keeps alphabetic words only
/// and drops stop words.
#[derive(Debug, Clone)]
pub struct TokenNormalizer {
    stop_words: HashSet<String>,
}

impl TokenNormalizer {
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Add extra words to ignore in queries.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(&word.to_lowercase())
    }
}

impl Default for TokenNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TermNormalizer for TokenNormalizer {
    fn normalize(&self, text: &str) -> String {
        text.trim().to_lowercase()
    }

    fn terms(&self, text: &str) -> HashSet<String> {
        WORD_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| !self.stop_words.contains(w))
            .collect()
    }
}
