//! Text-pair similarity, topic extraction, and contradiction detection.
//!
//! Similarity prefers the embedding capability when one is available and
//! falls back to token-overlap (Jaccard) similarity otherwise. The keyword
//! lists here are fixed heuristics by design; they are part of the
//! classification contract and are not to be silently replaced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use cadence_core::capability::EmbeddingProvider;
use cadence_core::types::clamp_unit;

/// Tokens dropped before topic extraction.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "and", "or", "but", "if",
    "then", "of", "to", "in", "on", "at", "by", "for", "with", "about", "from", "as", "that",
    "this", "these", "those", "it", "its", "they", "them", "we", "you", "i", "he", "she", "his",
    "her", "my", "your", "our", "do", "does", "did", "will", "would", "can", "could", "should",
    "have", "has", "had", "what", "which", "who", "when", "where", "how", "why", "not", "no", "so",
    "me", "us", "more",
];

/// Contrast/negation cues that mark a contradiction when the topic matches.
const CONTRAST_KEYWORDS: &[&str] = &[
    "but", "however", "not", "disagree", "actually", "instead", "wrong", "no",
];

/// Lowercase and strip punctuation, splitting on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Computes similarity, topics, and contradiction signals over raw text.
pub struct SimilarityEngine {
    embeddings: Arc<dyn EmbeddingProvider>,
    /// Minimum same-topic similarity before a contrast cue counts as a
    /// contradiction.
    contradiction_threshold: f64,
}

impl SimilarityEngine {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>, contradiction_threshold: f64) -> Self {
        Self {
            embeddings,
            contradiction_threshold,
        }
    }

    /// Similarity of two texts in [0, 1].
    ///
    /// Empty input on either side yields 0. With an available embedding
    /// capability the result is a clamped cosine; any embedding failure
    /// falls back to token overlap. Quota-class failures are expected and
    /// not logged; anything else gets a warning.
    pub async fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.trim().is_empty() || b.trim().is_empty() {
            return 0.0;
        }

        if self.embeddings.is_available() {
            let pair = tokio::join!(self.embeddings.embed(a), self.embeddings.embed(b));
            match pair {
                (Ok(va), Ok(vb)) => return clamp_unit(self.embeddings.similarity(&va, &vb)),
                (Err(e), _) | (_, Err(e)) => {
                    if !e.is_quota() {
                        warn!("Embedding similarity failed, using token overlap: {}", e);
                    }
                }
            }
        }

        Self::token_overlap(a, b)
    }

    /// Jaccard similarity over lowercase, punctuation-stripped tokens.
    pub fn token_overlap(a: &str, b: &str) -> f64 {
        let set_a: HashSet<String> = tokenize(a).into_iter().collect();
        let set_b: HashSet<String> = tokenize(b).into_iter().collect();
        if set_a.is_empty() || set_b.is_empty() {
            return 0.0;
        }
        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();
        intersection as f64 / union as f64
    }

    /// The 5 highest-frequency non-stopword tokens, most frequent first.
    /// Ties break alphabetically so the result is deterministic.
    pub fn extract_topics(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in tokenize(text) {
            if !STOP_WORDS.contains(&token.as_str()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(5).map(|(t, _)| t).collect()
    }

    /// All non-stopword tokens longer than 3 characters, deduplicated in
    /// order of first appearance. Used for Interaction semantics.
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize(text)
            .into_iter()
            .filter(|t| t.len() > 3 && !STOP_WORDS.contains(&t.as_str()))
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    /// True iff `b` is on the same topic as `a` (similarity at or above the
    /// contradiction threshold) and contains a contrast/negation cue.
    pub async fn detects_contradiction(&self, a: &str, b: &str) -> bool {
        let tokens_b: HashSet<String> = tokenize(b).into_iter().collect();
        let has_contrast = CONTRAST_KEYWORDS.iter().any(|k| tokens_b.contains(*k));
        if !has_contrast {
            return false;
        }
        self.similarity(a, b).await >= self.contradiction_threshold
    }
}
