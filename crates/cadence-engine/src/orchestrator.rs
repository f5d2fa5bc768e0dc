//! Turn orchestration.
//!
//! One entry point per half of a turn: `process_input` classifies the new
//! utterance against session state and merged history (interrupting any
//! in-flight narration first), and `save_interaction` persists the finished
//! turn. A per-session busy set gates concurrent processing: the second
//! caller gets `None` and decides for itself whether to queue or drop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use cadence_classify::{ClassificationContext, RelationshipClassifier, SimilarityEngine, TransitionSelector};
use cadence_core::capability::{
    EmbeddingProvider, NoEmbedding, NoSummarizer, NoVoice, Summarizer, VoiceOutput,
};
use cadence_core::config::CadenceConfig;
use cadence_core::error::{CadenceError, Result};
use cadence_core::types::{
    ClassificationResult, HistoryEntry, Interaction, InteractionId, Semantics, SessionId,
    SessionState, Timestamp,
};
use cadence_graph::ConceptGraph;
use cadence_memory::{
    DurableStore, MemoryRetriever, MemoryStore, NullDurableStore, RankedCandidate,
    RetrievalWeights,
};
use cadence_session::{InMemorySessionStore, InterruptionCoordinator, SessionStateStore};

/// Caller-supplied context for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub session_id: SessionId,
    pub user_id: String,
    /// Entity the utterance is about, when the caller already knows it.
    /// Absent, the orchestrator falls back to extracted topics.
    pub entity: Option<String>,
}

impl RequestContext {
    pub fn new(session_id: SessionId, user_id: impl Into<String>) -> Self {
        Self {
            session_id,
            user_id: user_id.into(),
            entity: None,
        }
    }
}

/// Everything a caller needs to respond to one classified utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub request_id: Uuid,
    pub classification: ClassificationResult,
    /// Session state as published at the end of processing.
    pub state: SessionState,
    pub recent_turns: Vec<String>,
    /// Merged history window the classification was made against.
    pub full_history: Vec<HistoryEntry>,
}

/// Wires the classifier, memory tiers, session state, and interruption
/// handling into the two turn-level operations.
pub struct Orchestrator {
    config: CadenceConfig,
    similarity: SimilarityEngine,
    classifier: RelationshipClassifier,
    memory: Arc<MemoryStore>,
    retriever: MemoryRetriever,
    sessions: Arc<dyn SessionStateStore>,
    interruptions: InterruptionCoordinator,
    busy: Mutex<HashSet<SessionId>>,
}

impl Orchestrator {
    pub fn new(
        config: CadenceConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        voice: Arc<dyn VoiceOutput>,
        durable: Arc<dyn DurableStore>,
        sessions: Arc<dyn SessionStateStore>,
        graph: Arc<ConceptGraph>,
    ) -> Self {
        let similarity = SimilarityEngine::new(
            Arc::clone(&embeddings),
            config.classifier.contradiction_threshold,
        );
        let classifier = RelationshipClassifier::new(
            SimilarityEngine::new(
                Arc::clone(&embeddings),
                config.classifier.contradiction_threshold,
            ),
            TransitionSelector::new(config.transition.recent_phrase_window),
            config.classifier.clone(),
        );
        let memory = Arc::new(MemoryStore::new(
            config.memory.clone(),
            Arc::clone(&embeddings),
            summarizer,
            durable,
        ));
        let retriever = MemoryRetriever::new(
            Arc::clone(&memory),
            Arc::clone(&embeddings),
            Arc::clone(&graph),
        );
        let interruptions = InterruptionCoordinator::new(
            Arc::clone(&sessions),
            voice,
            config.voice.clone(),
        );
        Self {
            config,
            similarity,
            classifier,
            memory,
            retriever,
            sessions,
            interruptions,
            busy: Mutex::new(HashSet::new()),
        }
    }

    /// Orchestrator with no remote capabilities and process-local stores.
    pub fn with_defaults(config: CadenceConfig) -> Self {
        Self::new(
            config,
            Arc::new(NoEmbedding),
            Arc::new(NoSummarizer),
            Arc::new(NoVoice),
            Arc::new(NullDurableStore),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ConceptGraph::new()),
        )
    }

    /// Classify one utterance. Returns `None` iff another call for the same
    /// session is still in flight; the busy flag is released on every exit
    /// path, success or error.
    pub async fn process_input(
        &self,
        input: &str,
        request: &RequestContext,
    ) -> Result<Option<ProcessOutcome>> {
        let session = request.session_id;
        if !self.try_acquire(session)? {
            info!(session = %session.0, "Session busy, input rejected");
            return Ok(None);
        }
        let outcome = self.run_turn(input, request).await;
        self.release(session);
        outcome.map(Some)
    }

    async fn run_turn(&self, input: &str, request: &RequestContext) -> Result<ProcessOutcome> {
        let session = request.session_id;
        let request_id = Uuid::new_v4();
        info!(session = %session.0, request = %request_id, "Processing input");

        let mut state = self.sessions.load(session).await?;
        if state.is_speaking {
            self.interruptions.interrupt_mid_sentence(session).await?;
            state = self.sessions.load(session).await?;
        }

        let full_history = self
            .memory
            .load_all_history(self.config.session.history_window)
            .await?;

        let new_entity = request
            .entity
            .clone()
            .or_else(|| self.similarity.extract_topics(input).into_iter().next());
        let ctx = ClassificationContext {
            current_sentence: state.current_sentence.clone(),
            recent_turns: state.recent_turns.iter().cloned().collect(),
            full_history: full_history.iter().map(|e| e.text().to_string()).collect(),
            current_entity: state.current_entity.clone(),
            new_entity: new_entity.clone(),
            is_first_interaction: state.recent_turns.is_empty() && full_history.is_empty(),
        };

        let classification = self.classifier.classify(input, &ctx).await;
        info!(
            session = %session.0,
            category = classification.category.code(),
            confidence = classification.confidence,
            "Input classified"
        );

        self.interruptions
            .handle_transition(session, &classification)
            .await?;

        let mut state = self.sessions.load(session).await?;
        state.push_turn(input.to_string(), self.config.session.recent_turn_window);
        if new_entity.is_some() {
            state.current_entity = new_entity;
        }
        state.current_topic = self.similarity.extract_topics(input).into_iter().next();
        self.sessions.publish(session, state.clone()).await?;

        Ok(ProcessOutcome {
            request_id,
            classification,
            recent_turns: state.recent_turns.iter().cloned().collect(),
            state,
            full_history,
        })
    }

    /// Persist a finished turn. Callers that ran their own pattern
    /// detection pass the result; `None` falls back to the store's
    /// analysis. Persistence failures are reported as `false`, never as
    /// an error that could terminate the session.
    pub async fn save_interaction(
        &self,
        input: &str,
        response: &str,
        classification: &ClassificationResult,
        patterns: Option<Vec<String>>,
        request: &RequestContext,
    ) -> bool {
        let patterns = match patterns {
            Some(patterns) => patterns,
            None => match self.memory.detect_patterns() {
                Ok(patterns) => patterns,
                Err(e) => {
                    warn!("Pattern analysis unavailable: {}", e);
                    Vec::new()
                }
            },
        };
        let combined = format!("{} {}", input, response);
        let record = Interaction {
            id: InteractionId::new(),
            input: input.to_string(),
            response: response.to_string(),
            category: classification.category,
            confidence: classification.confidence,
            similarity: classification.similarity,
            transition_phrase: classification.transition_phrase.clone(),
            timestamp: Timestamp::now(),
            session_id: request.session_id,
            user_id: request.user_id.clone(),
            semantics: Semantics {
                topics: self.similarity.extract_topics(&combined),
                keywords: self.similarity.extract_keywords(input),
                embedding: None,
                input_embedding: None,
                response_embedding: None,
            },
            summary: None,
            patterns,
        };
        match self.memory.save_interaction(record).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to persist interaction: {}", e);
                false
            }
        }
    }

    /// Retrieve stored interactions relevant to `query`, using the
    /// configured default weights.
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RankedCandidate>> {
        let weights = RetrievalWeights::from(&self.config.retrieval);
        self.retriever.retrieve(query, &weights, limit).await
    }

    /// Force the durable write queue to flush, e.g. at shutdown.
    pub async fn flush_memory(&self) -> Result<()> {
        self.memory.flush().await
    }

    /// Start the periodic durable flush. Abort the handle at shutdown,
    /// after a final `flush_memory`.
    pub fn start_flush_timer(&self) -> tokio::task::JoinHandle<()> {
        self.memory.spawn_flush_timer()
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStateStore> {
        &self.sessions
    }

    pub fn interruptions(&self) -> &InterruptionCoordinator {
        &self.interruptions
    }

    fn try_acquire(&self, session: SessionId) -> Result<bool> {
        let mut busy = self
            .busy
            .lock()
            .map_err(|e| CadenceError::Session(format!("busy set lock poisoned: {}", e)))?;
        Ok(busy.insert(session))
    }

    fn release(&self, session: SessionId) {
        match self.busy.lock() {
            Ok(mut busy) => {
                busy.remove(&session);
            }
            Err(e) => warn!("Busy set lock poisoned on release: {}", e),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
