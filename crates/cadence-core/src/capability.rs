//! Optional remote capability seams.
//!
//! Each capability is injected once at construction as a trait object; an
//! unavailable capability is represented by its `No*` implementation rather
//! than by `Option` checks at every call site. Every caller has a
//! synchronous, capability-free fallback, so none of these traits may block
//! the classify/respond path indefinitely.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::error::CapabilityError;
use crate::types::{cosine_similarity, Interaction};

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// Maps text to a fixed-length vector for similarity comparison.
///
/// Implementations must surface quota/billing rejections as
/// [`CapabilityError::Quota`] so callers can suppress warning logs for them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;

    /// Similarity between two previously computed vectors.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        cosine_similarity(a, b)
    }

    fn is_available(&self) -> bool;
}

/// The unavailable-embedding variant. Callers fall back to token overlap.
#[derive(Debug, Clone, Default)]
pub struct NoEmbedding;

#[async_trait]
impl EmbeddingProvider for NoEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Deterministic hash-based embedding for tests.
///
/// Identical inputs always produce identical unit vectors, so similarity,
/// caching, and dedup behavior can be tested without a real model.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(64);
        for i in 0..64 {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        // L2-normalize to unit vectors.
        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        if text.is_empty() {
            return Err(CapabilityError::Failed("cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn is_available(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Summarization
// ---------------------------------------------------------------------------

/// Condenses interactions into summary text. Gated by an enabled flag; a
/// disabled summarizer means aged interactions stay raw.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a single interaction. `None` means nothing worth keeping.
    async fn summarize_turn(
        &self,
        interaction: &Interaction,
    ) -> Result<Option<String>, CapabilityError>;

    /// Summarize a contiguous batch of aged interactions.
    async fn summarize_batch(
        &self,
        interactions: &[Interaction],
    ) -> Result<Option<String>, CapabilityError>;

    fn is_enabled(&self) -> bool;
}

/// The disabled-summarizer variant: aged interactions stay in the fast tier
/// as raw records.
#[derive(Debug, Clone, Default)]
pub struct NoSummarizer;

#[async_trait]
impl Summarizer for NoSummarizer {
    async fn summarize_turn(
        &self,
        _interaction: &Interaction,
    ) -> Result<Option<String>, CapabilityError> {
        Ok(None)
    }

    async fn summarize_batch(
        &self,
        _interactions: &[Interaction],
    ) -> Result<Option<String>, CapabilityError> {
        Ok(None)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Voice output
// ---------------------------------------------------------------------------

/// Spoken-output device. `stop` is idempotent and safe to call repeatedly,
/// including concurrently; interruption relies on that.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Speak the text to completion.
    async fn speak(&self, text: &str) -> Result<(), CapabilityError>;

    /// Stop any in-flight speech. Must never fail.
    async fn stop(&self);

    /// Character offset into the current sentence, if the device tracks it.
    fn playback_position(&self) -> Option<u64> {
        None
    }
}

/// The absent-voice variant: speech requests succeed silently.
#[derive(Debug, Clone, Default)]
pub struct NoVoice;

#[async_trait]
impl VoiceOutput for NoVoice {
    async fn speak(&self, _text: &str) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn stop(&self) {}
}
