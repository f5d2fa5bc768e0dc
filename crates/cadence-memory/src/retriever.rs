//! Multi-signal memory retrieval.
//!
//! Every fast-tier record is scored on four signals: recency (rank-based),
//! topic keyword coverage, semantic similarity (embedding cosine, computed
//! lazily and cached on the store), and concept-graph relatedness. The
//! signals are merged with caller-supplied weights; a signal whose inputs
//! are unavailable contributes zero rather than failing the retrieval.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use cadence_core::capability::EmbeddingProvider;
use cadence_core::config::RetrievalConfig;
use cadence_core::error::Result;
use cadence_core::types::{clamp_unit, cosine_similarity, Interaction};
use cadence_graph::ConceptGraph;

use crate::store::{tokens, MemoryStore};

/// Per-signal weights. They need not sum to one; combined scores are only
/// compared against each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalWeights {
    pub time: f64,
    pub topic: f64,
    pub semantic: f64,
    pub relation: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            time: 0.3,
            topic: 0.3,
            semantic: 0.3,
            relation: 0.1,
        }
    }
}

impl From<&RetrievalConfig> for RetrievalWeights {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            time: config.time_weight,
            topic: config.topic_weight,
            semantic: config.semantic_weight,
            relation: config.relation_weight,
        }
    }
}

/// One scored record, with the per-signal breakdown kept for inspection.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub interaction: Interaction,
    pub recency: f64,
    pub topic: f64,
    pub semantic: f64,
    pub relation: f64,
    pub combined: f64,
}

/// Scores stored interactions against a query.
pub struct MemoryRetriever {
    store: Arc<MemoryStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    graph: Arc<ConceptGraph>,
}

impl MemoryRetriever {
    pub fn new(
        store: Arc<MemoryStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        graph: Arc<ConceptGraph>,
    ) -> Self {
        Self {
            store,
            embeddings,
            graph,
        }
    }

    /// Score every fast-tier record against `query` and return the top
    /// `limit` candidates, best first.
    pub async fn retrieve(
        &self,
        query: &str,
        weights: &RetrievalWeights,
        limit: usize,
    ) -> Result<Vec<RankedCandidate>> {
        let interactions = self.store.snapshot_interactions()?;
        if interactions.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let total = interactions.len();

        let query_keywords = tokens(query);
        let query_vector = self.query_vector(query).await;
        let query_topics = self.graph.extract_topics_with_graph(query);
        let primary: HashSet<&String> = query_topics.primary.iter().collect();
        let neighbors: HashSet<&String> = query_topics.related.iter().collect();

        let mut candidates: Vec<RankedCandidate> = Vec::with_capacity(total);
        for (index, interaction) in interactions.into_iter().enumerate() {
            // Newest record ranks 0.
            let rank = total - 1 - index;
            let recency = 1.0 - rank as f64 / total as f64;
            let topic = topic_score(&query_keywords, &interaction);
            let semantic = match &query_vector {
                Some(vector) => self.semantic_score(vector, &interaction).await?,
                None => 0.0,
            };
            let relation = self.relation_score(&primary, &neighbors, &interaction);
            let combined = weights.time * recency
                + weights.topic * topic
                + weights.semantic * semantic
                + weights.relation * relation;
            candidates.push(RankedCandidate {
                interaction,
                recency,
                topic,
                semantic,
                relation,
                combined,
            });
        }

        candidates.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn query_vector(&self, query: &str) -> Option<Vec<f32>> {
        if !self.embeddings.is_available() {
            return None;
        }
        match self.embeddings.embed(query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                debug!("Query embedding unavailable, semantic signal off: {}", e);
                None
            }
        }
    }

    /// Cosine against the record's stored embedding, or one computed now
    /// and cached on the store for the next retrieval.
    async fn semantic_score(&self, query_vector: &[f32], interaction: &Interaction) -> Result<f64> {
        if let Some(stored) = &interaction.semantics.embedding {
            return Ok(clamp_unit(cosine_similarity(query_vector, stored)));
        }
        if let Some(cached) = self.store.cached_embedding(interaction.id)? {
            return Ok(clamp_unit(cosine_similarity(query_vector, &cached)));
        }
        let combined = format!("{} {}", interaction.input, interaction.response);
        match self.embeddings.embed(&combined).await {
            Ok(vector) => {
                let score = clamp_unit(cosine_similarity(query_vector, &vector));
                self.store.cache_embedding(interaction.id, vector)?;
                Ok(score)
            }
            Err(e) => {
                debug!("Record embedding unavailable: {}", e);
                Ok(0.0)
            }
        }
    }

    /// Graph relatedness: the record's own mapped nodes count 1.0 when they
    /// are a primary query node and 0.5 when a neighbor of one, normalized
    /// by the size of the query's node set.
    fn relation_score(
        &self,
        primary: &HashSet<&String>,
        neighbors: &HashSet<&String>,
        interaction: &Interaction,
    ) -> f64 {
        let denominator = (primary.len() + neighbors.len()) as f64;
        if denominator == 0.0 {
            return 0.0;
        }
        let mapped = self.graph.extract_topics_with_graph(&interaction.input);
        let mut score = 0.0;
        for node in &mapped.primary {
            if primary.contains(node) {
                score += 1.0;
            } else if neighbors.contains(node) {
                score += 0.5;
            }
        }
        clamp_unit(score / denominator)
    }
}

/// Fraction of query keywords present in the record's searchable text.
fn topic_score(query_keywords: &HashSet<String>, interaction: &Interaction) -> f64 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let mut haystack = tokens(&interaction.input);
    haystack.extend(tokens(&interaction.response));
    for topic in &interaction.semantics.topics {
        haystack.insert(topic.to_lowercase());
    }
    for keyword in &interaction.semantics.keywords {
        haystack.insert(keyword.to_lowercase());
    }
    let matched = query_keywords.iter().filter(|k| haystack.contains(*k)).count();
    matched as f64 / query_keywords.len() as f64
}

// =============================================================================
// Tests
// =============================================================================
