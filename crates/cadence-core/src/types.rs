use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Relationship of a new utterance to the prior conversation.
///
/// Nine fixed categories. The numeric codes (1-9) are part of the wire
/// contract with collaborators and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 1: continues the sentence currently being narrated.
    Continuation,
    /// 2: shifts to a topic from the recent turns.
    RelatedShift,
    /// 3: partially related to the recent conversation.
    PartialShift,
    /// 4: follows a detected conversational pattern.
    PatternFollowUp,
    /// 5: asks for clarification of something already said.
    Clarification,
    /// 6: an unrelated new topic (default fallback).
    NewTopic,
    /// 7: resumes an earlier, previously abandoned topic.
    Resumption,
    /// 8: contradicts the sentence currently being narrated.
    Contradiction,
    /// 9: the first utterance, with no prior context.
    Opening,
}

impl Category {
    /// Numeric code 1-9.
    pub fn code(&self) -> u8 {
        match self {
            Category::Continuation => 1,
            Category::RelatedShift => 2,
            Category::PartialShift => 3,
            Category::PatternFollowUp => 4,
            Category::Clarification => 5,
            Category::NewTopic => 6,
            Category::Resumption => 7,
            Category::Contradiction => 8,
            Category::Opening => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Category::Continuation),
            2 => Some(Category::RelatedShift),
            3 => Some(Category::PartialShift),
            4 => Some(Category::PatternFollowUp),
            5 => Some(Category::Clarification),
            6 => Some(Category::NewTopic),
            7 => Some(Category::Resumption),
            8 => Some(Category::Contradiction),
            9 => Some(Category::Opening),
            _ => None,
        }
    }

    /// Shift categories get entity-aware transition phrasing.
    pub fn is_shift(&self) -> bool {
        matches!(
            self,
            Category::RelatedShift | Category::PartialShift | Category::NewTopic
        )
    }
}

/// Per-session speech phase for interruption handling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPhase {
    #[default]
    Idle,
    Speaking,
    Interrupting,
    Paused,
    Transitioning,
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Unique identifier for a persisted interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub Uuid);

impl InteractionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a conversation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unix timestamp in seconds since epoch. Compared by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

// =============================================================================
// Numeric helpers
// =============================================================================

/// Clamp a score or confidence into [0, 1].
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Cosine similarity of two vectors, 0.0 when either is empty or zero-length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

// =============================================================================
// Entity Structs
// =============================================================================

/// Semantic annotations attached to an interaction.
///
/// Embeddings are optional: they are present only when the embedding
/// capability was available at save time, and may be filled in lazily by the
/// retriever afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Semantics {
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    /// Embedding of input + response combined.
    pub embedding: Option<Vec<f32>>,
    pub input_embedding: Option<Vec<f32>>,
    pub response_embedding: Option<Vec<f32>>,
}

/// One user turn and its narrated response. Append-only: never mutated after
/// creation, eventually represented only by a [`Summary`] once aged past the
/// retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub input: String,
    pub response: String,
    pub category: Category,
    pub confidence: f64,
    pub similarity: f64,
    pub transition_phrase: String,
    pub timestamp: Timestamp,
    pub session_id: SessionId,
    pub user_id: String,
    pub semantics: Semantics,
    pub summary: Option<String>,
    pub patterns: Vec<String>,
}

impl Interaction {
    /// Read-time deduplication key: timestamp plus the leading
    /// `prefix_len` characters of the input. The durable tier is
    /// at-least-once, so duplicates are collapsed by this key on load.
    pub fn dedup_key(&self, prefix_len: usize) -> (i64, String) {
        let prefix: String = self.input.chars().take(prefix_len).collect();
        (self.timestamp.0, prefix)
    }
}

/// Condensed record of a contiguous batch of aged interactions.
///
/// Created once by a background job; the originals remain in the fast tier
/// until evicted by the store's own policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    /// Interactions covered, oldest first.
    pub source_ids: Vec<InteractionId>,
    pub text: String,
    pub timestamp: Timestamp,
    pub count: usize,
}

/// Outcome of classifying one utterance. Ephemeral: embedded into the
/// interaction that follows, never stored independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f64,
    pub similarity: f64,
    pub transition_phrase: String,
    pub pattern: Option<String>,
}

/// A merged history entry: either a full interaction or a summary standing
/// in for an aged batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Full(Interaction),
    Summarized(Summary),
}

impl HistoryEntry {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            HistoryEntry::Full(i) => i.timestamp,
            HistoryEntry::Summarized(s) => s.timestamp,
        }
    }

    /// The text a classifier or retriever sees for this entry.
    pub fn text(&self) -> &str {
        match self {
            HistoryEntry::Full(i) => &i.input,
            HistoryEntry::Summarized(s) => &s.text,
        }
    }

    pub fn dedup_key(&self, prefix_len: usize) -> (i64, String) {
        match self {
            HistoryEntry::Full(i) => i.dedup_key(prefix_len),
            HistoryEntry::Summarized(s) => {
                let prefix: String = s.text.chars().take(prefix_len).collect();
                (s.timestamp.0, prefix)
            }
        }
    }
}

/// Playback position captured when narration was interrupted. Expires after
/// a TTL so a stale position is never resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptedPosition {
    pub sentence: String,
    /// Character offset into the sentence at the moment of interruption.
    pub offset: u64,
    pub expires_at: Timestamp,
}

impl InterruptedPosition {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.0 >= self.expires_at.0
    }
}

/// Mutable per-session conversation state.
///
/// Logically singular per session but physically shared across concurrent
/// process instances through an external store. Mutations are
/// read-modify-publish with last-write-wins; there is no transactional
/// guarantee beyond that.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SpeechPhase,
    pub is_speaking: bool,
    /// The sentence currently being narrated, if any.
    pub current_sentence: Option<String>,
    /// Bounded ring buffer of recent user turns, oldest first.
    pub recent_turns: VecDeque<String>,
    pub pause_requested: bool,
    pub pause_requested_at: Option<Timestamp>,
    pub interrupted: Option<InterruptedPosition>,
    pub current_topic: Option<String>,
    pub current_entity: Option<String>,
    pub last_transition: Option<String>,
}

impl SessionState {
    /// Append a turn, evicting the oldest once `capacity` is exceeded.
    pub fn push_turn(&mut self, turn: String, capacity: usize) {
        self.recent_turns.push_back(turn);
        while self.recent_turns.len() > capacity {
            self.recent_turns.pop_front();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes_round_trip() {
        for code in 1..=9u8 {
            let cat = Category::from_code(code).unwrap();
            assert_eq!(cat.code(), code);
        }
        assert!(Category::from_code(0).is_none());
        assert!(Category::from_code(10).is_none());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&Category::Resumption).unwrap();
        assert_eq!(json, "\"resumption\"");
        let rt: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(rt, Category::Resumption);
    }

    #[test]
    fn test_shift_categories() {
        assert!(Category::RelatedShift.is_shift());
        assert!(Category::PartialShift.is_shift());
        assert!(Category::NewTopic.is_shift());
        assert!(!Category::Continuation.is_shift());
        assert!(!Category::Opening.is_shift());
    }

    #[test]
    fn test_speech_phase_default() {
        assert_eq!(SpeechPhase::default(), SpeechPhase::Idle);
    }

    #[test]
    fn test_interaction_id_unique() {
        assert_ne!(InteractionId::default(), InteractionId::default());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let ts = Timestamp::from_datetime(now);
        assert_eq!(ts.to_datetime().timestamp(), now.timestamp());
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(0.4), 0.4);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        // Mismatched lengths are neutral, not an error.
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    fn sample_interaction(input: &str, ts: i64) -> Interaction {
        Interaction {
            id: InteractionId::new(),
            input: input.to_string(),
            response: "a response".to_string(),
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

    #[test]
    fn test_dedup_key_prefix() {
        let i = sample_interaction("abcdefghij", 100);
        let (ts, prefix) = i.dedup_key(4);
        assert_eq!(ts, 100);
        assert_eq!(prefix, "abcd");
    }

    #[test]
    fn test_dedup_key_short_input() {
        let i = sample_interaction("ab", 200);
        let (_, prefix) = i.dedup_key(200);
        assert_eq!(prefix, "ab");
    }

    #[test]
    fn test_history_entry_accessors() {
        let i = sample_interaction("hello there", 10);
        let entry = HistoryEntry::Full(i.clone());
        assert_eq!(entry.timestamp(), Timestamp(10));
        assert_eq!(entry.text(), "hello there");
        assert_eq!(entry.dedup_key(5), i.dedup_key(5));

        let s = Summary {
            id: Uuid::new_v4(),
            source_ids: vec![i.id],
            text: "a condensed summary".to_string(),
            timestamp: Timestamp(20),
            count: 1,
        };
        let entry = HistoryEntry::Summarized(s);
        assert_eq!(entry.timestamp(), Timestamp(20));
        assert_eq!(entry.text(), "a condensed summary");
    }

    #[test]
    fn test_interrupted_position_expiry() {
        let pos = InterruptedPosition {
            sentence: "Starlink revenue is driven by penetration rate.".to_string(),
            offset: 17,
            expires_at: Timestamp(1000),
        };
        assert!(!pos.is_expired(Timestamp(999)));
        assert!(pos.is_expired(Timestamp(1000)));
        assert!(pos.is_expired(Timestamp(2000)));
    }

    #[test]
    fn test_session_state_ring_buffer() {
        let mut state = SessionState::default();
        for i in 0..7 {
            state.push_turn(format!("turn {}", i), 5);
        }
        assert_eq!(state.recent_turns.len(), 5);
        assert_eq!(state.recent_turns.front().unwrap(), "turn 2");
        assert_eq!(state.recent_turns.back().unwrap(), "turn 6");
    }

    #[test]
    fn test_interaction_json_round_trip() {
        let i = sample_interaction("round trip input", 42);
        let json = serde_json::to_string(&i).unwrap();
        let rt: Interaction = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.id, i.id);
        assert_eq!(rt.input, i.input);
        assert_eq!(rt.category, i.category);
        assert_eq!(rt.timestamp, i.timestamp);
    }

    #[test]
    fn test_session_state_json_round_trip() {
        let mut state = SessionState {
            phase: SpeechPhase::Paused,
            is_speaking: false,
            current_sentence: Some("a sentence".to_string()),
            pause_requested: true,
            pause_requested_at: Some(Timestamp(5)),
            ..SessionState::default()
        };
        state.push_turn("one".to_string(), 10);
        let json = serde_json::to_string(&state).unwrap();
        let rt: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.phase, SpeechPhase::Paused);
        assert!(rt.pause_requested);
        assert_eq!(rt.recent_turns.len(), 1);
    }
}
