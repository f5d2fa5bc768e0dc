//! Tiered interaction memory.
//!
//! Two tiers: a bounded in-process fast tier holding full-detail records and
//! summaries, and a durable tier fed through a batched write queue. Writes
//! land in the fast tier synchronously; the durable tier is at-least-once,
//! with duplicates collapsed at read time by (timestamp, input prefix).
//! Aged interactions are condensed in the background when a summarizer is
//! enabled; the raw records stay in the fast tier until capacity evicts
//! them.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::capability::{EmbeddingProvider, Summarizer};
use cadence_core::config::MemoryConfig;
use cadence_core::error::{CadenceError, Result};
use cadence_core::types::{HistoryEntry, Interaction, InteractionId, Summary};

use crate::durable::DurableStore;

/// In-process tier: raw interactions, summaries, and derived caches.
#[derive(Default)]
struct FastTier {
    /// Oldest first, bounded by `fast_tier_capacity`.
    interactions: VecDeque<Interaction>,
    summaries: Vec<Summary>,
    /// Ids claimed by a summarization job (in flight or done). Claimed
    /// records are excluded from merged history once a summary covers them.
    summarized: HashSet<InteractionId>,
    /// Embeddings computed lazily by the retriever.
    embedding_cache: HashMap<InteractionId, Vec<f32>>,
    analysis: Option<CachedAnalysis>,
}

/// Pattern/chain analysis memoized against the recent-input fingerprint.
struct CachedAnalysis {
    key: u64,
    patterns: Vec<String>,
    chains: Vec<Vec<InteractionId>>,
    computed_at: Instant,
}

struct WriteQueue {
    pending: Vec<Interaction>,
    last_flush: Instant,
}

/// Tiered store for interaction records.
pub struct MemoryStore {
    config: MemoryConfig,
    embeddings: Arc<dyn EmbeddingProvider>,
    summarizer: Arc<dyn Summarizer>,
    durable: Arc<dyn DurableStore>,
    fast: Arc<Mutex<FastTier>>,
    queue: Arc<Mutex<WriteQueue>>,
}

impl MemoryStore {
    pub fn new(
        config: MemoryConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            config,
            embeddings,
            summarizer,
            durable,
            fast: Arc::new(Mutex::new(FastTier::default())),
            queue: Arc::new(Mutex::new(WriteQueue {
                pending: Vec::new(),
                last_flush: Instant::now(),
            })),
        }
    }

    fn lock_fast(&self) -> Result<MutexGuard<'_, FastTier>> {
        self.fast
            .lock()
            .map_err(|e| CadenceError::Memory(format!("fast tier lock poisoned: {}", e)))
    }

    fn lock_queue(&self) -> Result<MutexGuard<'_, WriteQueue>> {
        self.queue
            .lock()
            .map_err(|e| CadenceError::Memory(format!("write queue lock poisoned: {}", e)))
    }

    /// Persist one interaction: enrich with embeddings when the capability
    /// is available, append to the fast tier, kick off summarization when
    /// the unsummarized backlog exceeds the retention threshold, and queue
    /// the record for the durable tier.
    pub async fn save_interaction(&self, mut record: Interaction) -> Result<()> {
        if self.embeddings.is_available() {
            let combined = format!("{} {}", record.input, record.response);
            if record.semantics.embedding.is_none() {
                record.semantics.embedding = self.try_embed(&combined).await;
            }
            if record.semantics.input_embedding.is_none() {
                record.semantics.input_embedding = self.try_embed(&record.input).await;
            }
            if record.semantics.response_embedding.is_none() {
                record.semantics.response_embedding = self.try_embed(&record.response).await;
            }
        }

        let summary_batch = {
            let mut fast = self.lock_fast()?;
            fast.interactions.push_back(record.clone());
            while fast.interactions.len() > self.config.fast_tier_capacity {
                if let Some(evicted) = fast.interactions.pop_front() {
                    fast.summarized.remove(&evicted.id);
                    fast.embedding_cache.remove(&evicted.id);
                }
            }
            self.claim_summary_batch(&mut fast)
        };

        if let Some(batch) = summary_batch {
            self.spawn_summarization(batch);
        }

        self.enqueue_durable(record).await;
        Ok(())
    }

    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embeddings.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                if e.is_quota() {
                    debug!("Embedding quota exhausted, storing without vector");
                } else {
                    warn!("Embedding failed: {}", e);
                }
                None
            }
        }
    }

    /// If the unsummarized backlog exceeds the retention threshold, claim
    /// the oldest batch for the background job. Claiming up front keeps
    /// subsequent saves from re-summarizing the same records.
    fn claim_summary_batch(&self, fast: &mut FastTier) -> Option<Vec<Interaction>> {
        if !self.summarizer.is_enabled() {
            return None;
        }
        let unsummarized: Vec<Interaction> = fast
            .interactions
            .iter()
            .filter(|i| !fast.summarized.contains(&i.id))
            .cloned()
            .collect();
        if unsummarized.len() <= self.config.retention_threshold {
            return None;
        }
        let batch: Vec<Interaction> = unsummarized
            .into_iter()
            .take(self.config.summary_batch_size)
            .collect();
        for interaction in &batch {
            fast.summarized.insert(interaction.id);
        }
        Some(batch)
    }

    /// Fire-and-forget: a summarization failure never blocks or fails the
    /// save path. On error the claim is released so a later save retries.
    fn spawn_summarization(&self, batch: Vec<Interaction>) {
        let summarizer = Arc::clone(&self.summarizer);
        let fast = Arc::clone(&self.fast);
        tokio::spawn(async move {
            let ids: Vec<InteractionId> = batch.iter().map(|i| i.id).collect();
            match summarizer.summarize_batch(&batch).await {
                Ok(Some(text)) => {
                    let timestamp = batch
                        .last()
                        .map(|i| i.timestamp)
                        .unwrap_or_else(cadence_core::types::Timestamp::now);
                    let summary = Summary {
                        id: Uuid::new_v4(),
                        source_ids: ids,
                        count: batch.len(),
                        text,
                        timestamp,
                    };
                    if let Ok(mut guard) = fast.lock() {
                        info!(count = summary.count, "Condensed aged interactions");
                        guard.summaries.push(summary);
                    }
                }
                Ok(None) => {
                    debug!("Summarizer produced no text for aged batch");
                }
                Err(e) => {
                    if e.is_quota() {
                        debug!("Summarization quota exhausted, batch stays raw");
                    } else {
                        warn!("Summarization failed: {}", e);
                    }
                    if let Ok(mut guard) = fast.lock() {
                        for id in &ids {
                            guard.summarized.remove(id);
                        }
                    }
                }
            }
        });
    }

    /// Queue the record for the durable tier, flushing when the batch size
    /// or the flush interval is reached.
    async fn enqueue_durable(&self, record: Interaction) {
        let batch = match self.lock_queue() {
            Ok(mut queue) => {
                queue.pending.push(record);
                let due = queue.pending.len() >= self.config.durable_batch_size
                    || queue.last_flush.elapsed()
                        >= Duration::from_secs(self.config.flush_interval_secs);
                if due {
                    queue.last_flush = Instant::now();
                    Some(std::mem::take(&mut queue.pending))
                } else {
                    None
                }
            }
            Err(e) => {
                warn!("Write queue unavailable, record kept in fast tier only: {}", e);
                None
            }
        };
        if let Some(batch) = batch {
            if let Err(e) = self.write_batch(batch).await {
                warn!("Durable flush failed, batch re-queued: {}", e);
            }
        }
    }

    async fn write_batch(&self, batch: Vec<Interaction>) -> Result<()> {
        match self.durable.insert_many(&batch).await {
            Ok(()) => {
                debug!(count = batch.len(), "Flushed batch to durable tier");
                Ok(())
            }
            Err(e) => {
                // Whole batch goes back, ahead of anything queued since.
                let mut queue = self.lock_queue()?;
                let tail = std::mem::take(&mut queue.pending);
                queue.pending = batch;
                queue.pending.extend(tail);
                Err(e)
            }
        }
    }

    /// Force a flush of the durable write queue, regardless of batch size
    /// or timer. A failed batch is re-queued and the error returned.
    pub async fn flush(&self) -> Result<()> {
        let batch = {
            let mut queue = self.lock_queue()?;
            if queue.pending.is_empty() {
                return Ok(());
            }
            queue.last_flush = Instant::now();
            std::mem::take(&mut queue.pending)
        };
        self.write_batch(batch).await
    }

    /// Spawn the periodic durable flush. Enqueue-time checks only run when
    /// a save arrives, so without this task an idle process would hold a
    /// below-batch-size tail in memory indefinitely. Abort the returned
    /// handle at shutdown, after a final `flush`.
    pub fn spawn_flush_timer(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let period = Duration::from_secs(self.config.flush_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = store.flush().await {
                    warn!("Periodic durable flush failed: {}", e);
                }
            }
        })
    }

    /// Merged conversation history, ascending by timestamp, deduplicated,
    /// trimmed to the most recent `limit` entries.
    ///
    /// With summarization enabled, aged fast-tier records are represented
    /// by their summaries; without it, every fast-tier record appears raw.
    pub async fn load_all_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = Vec::new();
        {
            let fast = self.lock_fast()?;
            if self.summarizer.is_enabled() {
                let covered: HashSet<InteractionId> = fast
                    .summaries
                    .iter()
                    .flat_map(|s| s.source_ids.iter().copied())
                    .collect();
                for interaction in &fast.interactions {
                    if !covered.contains(&interaction.id) {
                        entries.push(HistoryEntry::Full(interaction.clone()));
                    }
                }
                for summary in &fast.summaries {
                    entries.push(HistoryEntry::Summarized(summary.clone()));
                }
            } else {
                for interaction in &fast.interactions {
                    entries.push(HistoryEntry::Full(interaction.clone()));
                }
            }
        }
        // Fast-tier entries precede durable ones so the enriched copy wins
        // the dedup when both tiers hold the same record.
        for interaction in self.durable.fetch_all().await? {
            entries.push(HistoryEntry::Full(interaction));
        }

        entries.sort_by_key(|e| e.timestamp());
        let mut seen: HashSet<(i64, String)> = HashSet::new();
        entries.retain(|e| seen.insert(e.dedup_key(self.config.dedup_prefix_len)));

        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }

    /// Conversational pattern tags over the recent fast-tier inputs.
    pub fn detect_patterns(&self) -> Result<Vec<String>> {
        Ok(self.analyze()?.0)
    }

    /// Chains of consecutive interactions linked by shared topics.
    pub fn infer_chains(&self) -> Result<Vec<Vec<InteractionId>>> {
        Ok(self.analyze()?.1)
    }

    /// Run (or reuse) the pattern/chain analysis. Memoized against a
    /// fingerprint of the last ten inputs with a TTL, so repeated calls
    /// between saves are free.
    fn analyze(&self) -> Result<(Vec<String>, Vec<Vec<InteractionId>>)> {
        let ttl = Duration::from_secs(self.config.pattern_cache_ttl_secs);
        let mut fast = self.lock_fast()?;

        let key = analysis_key(&fast.interactions);
        if let Some(cached) = &fast.analysis {
            if cached.key == key && cached.computed_at.elapsed() < ttl {
                return Ok((cached.patterns.clone(), cached.chains.clone()));
            }
        }

        let recent: Vec<&Interaction> = fast
            .interactions
            .iter()
            .rev()
            .take(ANALYSIS_WINDOW)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let inputs: Vec<&str> = recent.iter().map(|i| i.input.as_str()).collect();
        let patterns = detect_input_patterns(&inputs);
        let chains = infer_topic_chains(fast.interactions.make_contiguous());

        fast.analysis = Some(CachedAnalysis {
            key,
            patterns: patterns.clone(),
            chains: chains.clone(),
            computed_at: Instant::now(),
        });
        Ok((patterns, chains))
    }

    /// Fast-tier records, oldest first. Retrieval scores over this set.
    pub fn snapshot_interactions(&self) -> Result<Vec<Interaction>> {
        Ok(self.lock_fast()?.interactions.iter().cloned().collect())
    }

    pub fn summaries(&self) -> Result<Vec<Summary>> {
        Ok(self.lock_fast()?.summaries.clone())
    }

    pub fn cached_embedding(&self, id: InteractionId) -> Result<Option<Vec<f32>>> {
        Ok(self.lock_fast()?.embedding_cache.get(&id).cloned())
    }

    pub fn cache_embedding(&self, id: InteractionId, vector: Vec<f32>) -> Result<()> {
        self.lock_fast()?.embedding_cache.insert(id, vector);
        Ok(())
    }

    pub fn fast_tier_len(&self) -> Result<usize> {
        Ok(self.lock_fast()?.interactions.len())
    }

    pub fn queued_len(&self) -> Result<usize> {
        Ok(self.lock_queue()?.pending.len())
    }
}

/// Inputs inspected by the pattern heuristics and the cache fingerprint.
const ANALYSIS_WINDOW: usize = 10;

/// Characters of each input folded into the cache fingerprint.
const FINGERPRINT_PREFIX: usize = 50;

fn analysis_key(interactions: &VecDeque<Interaction>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for interaction in interactions.iter().rev().take(ANALYSIS_WINDOW) {
        let prefix: String = interaction.input.chars().take(FINGERPRINT_PREFIX).collect();
        prefix.hash(&mut hasher);
    }
    hasher.finish()
}

pub(crate) fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 3)
        .map(|t| t.to_string())
        .collect()
}

/// Unfiltered token set. The thread heuristic scores over every token; the
/// length cutoff in `tokens` applies only to keywords and topic chains.
fn all_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let total = a.union(b).count();
    shared as f64 / total as f64
}

fn is_question(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    let opener = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    matches!(
        opener.as_str(),
        "what" | "how" | "why" | "when" | "where" | "who" | "which" | "can" | "does" | "is"
    )
}

/// Pattern tags over a window of recent inputs. Needs at least two turns.
fn detect_input_patterns(inputs: &[&str]) -> Vec<String> {
    let mut patterns = Vec::new();
    if inputs.len() < 2 {
        return patterns;
    }

    let questions = inputs.iter().filter(|i| is_question(i)).count();
    if questions as f64 / inputs.len() as f64 >= 0.6 {
        patterns.push("question_series".to_string());
    }

    let sets: Vec<HashSet<String>> = inputs.iter().map(|i| all_tokens(i)).collect();
    let mut total = 0.0;
    for pair in sets.windows(2) {
        total += jaccard(&pair[0], &pair[1]);
    }
    if total / (sets.len() - 1) as f64 > 0.5 {
        patterns.push("topic_thread".to_string());
    }

    patterns
}

/// Group consecutive interactions that share a topic into chains. An
/// interaction with no declared topics falls back to its input tokens.
fn infer_topic_chains(interactions: &[Interaction]) -> Vec<Vec<InteractionId>> {
    let topic_set = |i: &Interaction| -> HashSet<String> {
        if i.semantics.topics.is_empty() {
            tokens(&i.input)
        } else {
            i.semantics.topics.iter().map(|t| t.to_lowercase()).collect()
        }
    };

    let mut chains: Vec<Vec<InteractionId>> = Vec::new();
    let mut current: Vec<InteractionId> = Vec::new();
    let mut previous: Option<HashSet<String>> = None;

    for interaction in interactions {
        let topics = topic_set(interaction);
        let linked = previous
            .as_ref()
            .map(|prev| !prev.is_disjoint(&topics))
            .unwrap_or(false);
        if linked {
            current.push(interaction.id);
        } else {
            if current.len() >= 2 {
                chains.push(std::mem::take(&mut current));
            }
            current = vec![interaction.id];
        }
        previous = Some(topics);
    }
    if current.len() >= 2 {
        chains.push(current);
    }
    chains
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::time::sleep;

    use cadence_core::capability::{MockEmbedding, NoEmbedding, NoSummarizer};
    use cadence_core::error::CapabilityError;
    use cadence_core::types::{Category, Semantics, SessionId, Timestamp};

    use crate::durable::InMemoryDurableStore;

    use super::*;

    fn record(input: &str, ts: i64) -> Interaction {
        Interaction {
            id: InteractionId::new(),
            input: input.to_string(),
            response: "a narrated response".to_string(),
            category: Category::NewTopic,
            confidence: 0.7,
            similarity: 0.0,
            transition_phrase: String::new(),
            timestamp: Timestamp(ts),
            session_id: SessionId::new(),
            user_id: "user-1".to_string(),
            semantics: Semantics::default(),
            summary: None,
            patterns: vec![],
        }
    }

    fn store_with(
        config: MemoryConfig,
        durable: Arc<InMemoryDurableStore>,
    ) -> MemoryStore {
        MemoryStore::new(
            config,
            Arc::new(NoEmbedding),
            Arc::new(NoSummarizer),
            durable,
        )
    }

    struct FixedSummarizer {
        calls: AtomicUsize,
    }

    impl FixedSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize_turn(
            &self,
            _interaction: &Interaction,
        ) -> std::result::Result<Option<String>, CapabilityError> {
            Ok(Some("one turn".to_string()))
        }

        async fn summarize_batch(
            &self,
            interactions: &[Interaction],
        ) -> std::result::Result<Option<String>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("condensed {} turns", interactions.len())))
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize_turn(
            &self,
            _interaction: &Interaction,
        ) -> std::result::Result<Option<String>, CapabilityError> {
            Err(CapabilityError::Failed("down".to_string()))
        }

        async fn summarize_batch(
            &self,
            _interactions: &[Interaction],
        ) -> std::result::Result<Option<String>, CapabilityError> {
            Err(CapabilityError::Failed("down".to_string()))
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    // ========================================================================
    // Save / flush
    // ========================================================================

    #[tokio::test]
    async fn test_save_lands_in_fast_tier() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        store.save_interaction(record("hello", 1)).await.unwrap();
        assert_eq!(store.fast_tier_len().unwrap(), 1);
        assert_eq!(store.queued_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_flushes_at_batch_size() {
        let config = MemoryConfig {
            durable_batch_size: 2,
            ..MemoryConfig::default()
        };
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = store_with(config, Arc::clone(&durable));

        store.save_interaction(record("one", 1)).await.unwrap();
        assert_eq!(durable.len(), 0);
        assert_eq!(store.queued_len().unwrap(), 1);

        store.save_interaction(record("two", 2)).await.unwrap();
        assert_eq!(durable.len(), 2);
        assert_eq!(store.queued_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_batch() {
        let config = MemoryConfig {
            durable_batch_size: 1,
            ..MemoryConfig::default()
        };
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = store_with(config, Arc::clone(&durable));

        durable.fail_next_insert();
        store.save_interaction(record("kept", 1)).await.unwrap();
        assert_eq!(durable.len(), 0);
        assert_eq!(store.queued_len().unwrap(), 1);

        // Next save triggers another flush carrying the re-queued record.
        store.save_interaction(record("next", 2)).await.unwrap();
        assert_eq!(durable.len(), 2);
        assert_eq!(store.queued_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_flush_drains_queue() {
        let store_durable = Arc::new(InMemoryDurableStore::new());
        let store = store_with(MemoryConfig::default(), Arc::clone(&store_durable));
        store.save_interaction(record("pending", 1)).await.unwrap();
        assert_eq!(store_durable.len(), 0);
        store.flush().await.unwrap();
        assert_eq!(store_durable.len(), 1);
        assert_eq!(store.queued_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_timer_flushes_idle_tail() {
        let config = MemoryConfig {
            durable_batch_size: 10,
            flush_interval_secs: 1,
            ..MemoryConfig::default()
        };
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = Arc::new(store_with(config, Arc::clone(&durable)));
        let handle = store.spawn_flush_timer();

        // A single save is below the batch size; without the timer it
        // would sit in the queue forever.
        store.save_interaction(record("idle tail", 1)).await.unwrap();
        assert_eq!(durable.len(), 0);

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(durable.len(), 1);
        assert_eq!(store.queued_len().unwrap(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_fast_tier_evicts_oldest_at_capacity() {
        let config = MemoryConfig {
            fast_tier_capacity: 3,
            durable_batch_size: 1,
            ..MemoryConfig::default()
        };
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = store_with(config, Arc::clone(&durable));

        for i in 0..5 {
            store
                .save_interaction(record(&format!("input number {}", i), i))
                .await
                .unwrap();
        }
        assert_eq!(store.fast_tier_len().unwrap(), 3);
        let snapshot = store.snapshot_interactions().unwrap();
        assert_eq!(snapshot[0].input, "input number 2");
        // Evicted records survive in the durable tier.
        assert_eq!(durable.len(), 5);
        let history = store.load_all_history(10).await.unwrap();
        assert_eq!(history.len(), 5);
    }

    #[tokio::test]
    async fn test_save_computes_embeddings_when_available() {
        let store = MemoryStore::new(
            MemoryConfig::default(),
            Arc::new(MockEmbedding::new()),
            Arc::new(NoSummarizer),
            Arc::new(InMemoryDurableStore::new()),
        );
        store.save_interaction(record("embed me", 1)).await.unwrap();
        let snapshot = store.snapshot_interactions().unwrap();
        let semantics = &snapshot[0].semantics;
        assert!(semantics.embedding.is_some());
        assert!(semantics.input_embedding.is_some());
        assert!(semantics.response_embedding.is_some());
    }

    #[tokio::test]
    async fn test_save_without_embeddings_still_persists() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        store.save_interaction(record("no vectors", 1)).await.unwrap();
        let snapshot = store.snapshot_interactions().unwrap();
        assert!(snapshot[0].semantics.embedding.is_none());
    }

    // ========================================================================
    // History merge
    // ========================================================================

    #[tokio::test]
    async fn test_history_deduplicates_across_tiers() {
        let config = MemoryConfig {
            durable_batch_size: 1,
            ..MemoryConfig::default()
        };
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = store_with(config, Arc::clone(&durable));

        let r = record("appears once", 10);
        store.save_interaction(r.clone()).await.unwrap();
        // The durable tier is at-least-once: force a second copy.
        durable.insert_many(&[r]).await.unwrap();
        assert_eq!(durable.len(), 2);

        let history = store.load_all_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_history_sorted_ascending_and_limited() {
        let config = MemoryConfig {
            durable_batch_size: 100,
            ..MemoryConfig::default()
        };
        let store = store_with(config, Arc::new(InMemoryDurableStore::new()));
        for i in 0..5 {
            store
                .save_interaction(record(&format!("turn {}", i), i))
                .await
                .unwrap();
        }
        let history = store.load_all_history(3).await.unwrap();
        assert_eq!(history.len(), 3);
        // Most recent three, still ascending.
        assert_eq!(history[0].text(), "turn 2");
        assert_eq!(history[2].text(), "turn 4");
    }

    #[tokio::test]
    async fn test_history_empty_store() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        assert!(store.load_all_history(10).await.unwrap().is_empty());
    }

    // ========================================================================
    // Summarization
    // ========================================================================

    #[tokio::test]
    async fn test_backlog_triggers_summarization() {
        let config = MemoryConfig {
            retention_threshold: 3,
            summary_batch_size: 2,
            durable_batch_size: 100,
            ..MemoryConfig::default()
        };
        let summarizer = Arc::new(FixedSummarizer::new());
        let store = MemoryStore::new(
            config,
            Arc::new(NoEmbedding),
            Arc::clone(&summarizer) as Arc<dyn Summarizer>,
            Arc::new(InMemoryDurableStore::new()),
        );

        for i in 0..4 {
            store
                .save_interaction(record(&format!("aging turn {}", i), i))
                .await
                .unwrap();
        }
        sleep(Duration::from_millis(50)).await;

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].text, "condensed 2 turns");

        // History shows the summary instead of the two covered records.
        let history = store.load_all_history(20).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(matches!(history[0], HistoryEntry::Summarized(_)));
    }

    #[tokio::test]
    async fn test_no_summarization_below_threshold() {
        let config = MemoryConfig {
            retention_threshold: 10,
            ..MemoryConfig::default()
        };
        let summarizer = Arc::new(FixedSummarizer::new());
        let store = MemoryStore::new(
            config,
            Arc::new(NoEmbedding),
            Arc::clone(&summarizer) as Arc<dyn Summarizer>,
            Arc::new(InMemoryDurableStore::new()),
        );
        for i in 0..5 {
            store.save_interaction(record("turn", i)).await.unwrap();
        }
        sleep(Duration::from_millis(20)).await;
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
        assert!(store.summaries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_summarization_keeps_records_raw() {
        let config = MemoryConfig {
            retention_threshold: 2,
            summary_batch_size: 2,
            durable_batch_size: 100,
            ..MemoryConfig::default()
        };
        let store = MemoryStore::new(
            config,
            Arc::new(NoEmbedding),
            Arc::new(FailingSummarizer),
            Arc::new(InMemoryDurableStore::new()),
        );
        for i in 0..3 {
            store
                .save_interaction(record(&format!("raw turn {}", i), i))
                .await
                .unwrap();
        }
        sleep(Duration::from_millis(50)).await;
        assert!(store.summaries().unwrap().is_empty());
        // Every record still appears in full.
        let history = store.load_all_history(20).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| matches!(e, HistoryEntry::Full(_))));
    }

    // ========================================================================
    // Patterns and chains
    // ========================================================================

    #[tokio::test]
    async fn test_detect_patterns_question_series() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        for i in 0..4 {
            store
                .save_interaction(record(&format!("what drives metric {}?", i), i))
                .await
                .unwrap();
        }
        let patterns = store.detect_patterns().unwrap();
        assert!(patterns.contains(&"question_series".to_string()));
    }

    #[tokio::test]
    async fn test_detect_patterns_needs_two_turns() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        store.save_interaction(record("what is this?", 1)).await.unwrap();
        assert!(store.detect_patterns().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_infer_chains_groups_by_shared_topic() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        let mut a = record("first", 1);
        a.semantics.topics = vec!["revenue".to_string()];
        let mut b = record("second", 2);
        b.semantics.topics = vec!["revenue".to_string(), "churn".to_string()];
        let mut c = record("third", 3);
        c.semantics.topics = vec!["weather".to_string()];
        let (ida, idb) = (a.id, b.id);

        store.save_interaction(a).await.unwrap();
        store.save_interaction(b).await.unwrap();
        store.save_interaction(c).await.unwrap();

        let chains = store.infer_chains().unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0], vec![ida, idb]);
    }

    #[tokio::test]
    async fn test_analysis_cache_reused_between_saves() {
        let store = store_with(MemoryConfig::default(), Arc::new(InMemoryDurableStore::new()));
        store.save_interaction(record("what is churn?", 1)).await.unwrap();
        store.save_interaction(record("what is churn rate?", 2)).await.unwrap();
        let first = store.detect_patterns().unwrap();
        let second = store.detect_patterns().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_detect_input_patterns_mixed() {
        // 2 of 5 questions: below the 0.6 ratio.
        let inputs = [
            "what about churn?",
            "tell me about revenue growth today",
            "how does that work?",
            "let us move on to margins now",
            "margins look thin to me overall",
        ];
        let patterns = detect_input_patterns(&inputs);
        assert!(!patterns.contains(&"question_series".to_string()));
    }

    #[test]
    fn test_detect_topic_thread() {
        // Consecutive inputs share most tokens: average Jaccard above 0.5.
        let inputs = [
            "starlink penetration rate growth",
            "starlink penetration rate model",
            "starlink penetration rate detail",
        ];
        let patterns = detect_input_patterns(&inputs);
        assert!(patterns.contains(&"topic_thread".to_string()));
    }

    #[test]
    fn test_topic_thread_counts_short_tokens() {
        // Stop words and short tokens are part of the thread score, the
        // same way the classifier's pattern heuristic counts them: 4/6
        // here, but only 1/2 if the length cutoff applied.
        let inputs = ["the rate is up now", "the rate is down now"];
        let patterns = detect_input_patterns(&inputs);
        assert!(patterns.contains(&"topic_thread".to_string()));
    }

    #[test]
    fn test_is_question_forms() {
        assert!(is_question("what drives revenue"));
        assert!(is_question("Is that right?"));
        assert!(is_question("margins?"));
        assert!(!is_question("revenue grew fast"));
    }
}
