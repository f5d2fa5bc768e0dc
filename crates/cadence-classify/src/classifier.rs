//! Relationship classification: an ordered cascade of rules mapping a new
//! utterance to one of nine categories.
//!
//! The rule order is itself the contract: resumption must be checked before
//! continuation, contradiction before the similarity cascade, and so on.
//! `RULE_ORDER` is the single source of that sequence and is under test.

use std::collections::HashSet;

use cadence_core::config::ClassifierConfig;
use cadence_core::types::{clamp_unit, Category, ClassificationResult};

use crate::similarity::{tokenize, SimilarityEngine};
use crate::transition::TransitionSelector;

/// Cues that signal the user wants to return to an earlier topic.
const RESUMPTION_CUES: &[&str] = &[
    "back to",
    "resume",
    "earlier",
    "previous",
    "go back",
    "return to",
    "as we discussed",
    "like before",
];

/// Cues that signal a request for clarification.
const CLARIFICATION_CUES: &[&str] = &[
    "what",
    "how",
    "why",
    "explain",
    "tell me more",
    "clarify",
    "elaborate",
    "meaning",
];

/// Question openers for the pattern heuristic.
const QUESTION_OPENERS: &[&str] = &["what", "how", "why", "when", "where", "who", "which", "can", "does", "is"];

/// The named classification rules, in evaluation order. First match wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    /// No prior context at all: category 9.
    Opening,
    /// Resumption cue plus similarity to a historical turn: category 7.
    Resumption,
    /// Contrast cue against the sentence in progress: category 8.
    Contradiction,
    /// Similarity cascade over current/recent turns: categories 1-6.
    SimilarityCascade,
}

/// Fixed evaluation order. Changing this changes category outcomes.
pub const RULE_ORDER: [Rule; 4] = [
    Rule::Opening,
    Rule::Resumption,
    Rule::Contradiction,
    Rule::SimilarityCascade,
];

/// Conversation context handed to `classify`.
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    /// The sentence currently being narrated, if narration is in progress.
    pub current_sentence: Option<String>,
    /// Recent user turns, oldest first.
    pub recent_turns: Vec<String>,
    /// Longer history (inputs or summaries), oldest first.
    pub full_history: Vec<String>,
    /// Entity the narration is currently about.
    pub current_entity: Option<String>,
    /// Entity the new utterance is about, when the caller knows it.
    pub new_entity: Option<String>,
    pub is_first_interaction: bool,
}

impl ClassificationContext {
    fn has_no_context(&self) -> bool {
        let no_sentence = self
            .current_sentence
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        self.is_first_interaction || (no_sentence && self.recent_turns.is_empty())
    }

    fn entities(&self) -> Option<(&str, &str)> {
        match (&self.current_entity, &self.new_entity) {
            (Some(prev), Some(new)) => Some((prev.as_str(), new.as_str())),
            _ => None,
        }
    }
}

/// Classifies each utterance against the running conversation.
pub struct RelationshipClassifier {
    similarity: SimilarityEngine,
    transitions: TransitionSelector,
    config: ClassifierConfig,
}

impl RelationshipClassifier {
    pub fn new(
        similarity: SimilarityEngine,
        transitions: TransitionSelector,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            similarity,
            transitions,
            config,
        }
    }

    /// Run the rule cascade. Always returns a result; the similarity
    /// cascade's fallback branch matches everything.
    pub async fn classify(
        &self,
        input: &str,
        ctx: &ClassificationContext,
    ) -> ClassificationResult {
        for rule in RULE_ORDER {
            if let Some(result) = self.apply(rule, input, ctx).await {
                return result;
            }
        }
        // The cascade fallback always matches; this is unreachable but the
        // compiler cannot know that.
        self.finish(Category::NewTopic, 0.7, 0.0, None, ctx)
    }

    async fn apply(
        &self,
        rule: Rule,
        input: &str,
        ctx: &ClassificationContext,
    ) -> Option<ClassificationResult> {
        match rule {
            Rule::Opening => self.rule_opening(ctx),
            Rule::Resumption => self.rule_resumption(input, ctx).await,
            Rule::Contradiction => self.rule_contradiction(input, ctx).await,
            Rule::SimilarityCascade => Some(self.rule_cascade(input, ctx).await),
        }
    }

    fn rule_opening(&self, ctx: &ClassificationContext) -> Option<ClassificationResult> {
        if ctx.has_no_context() {
            return Some(self.finish(Category::Opening, 1.0, 0.0, None, ctx));
        }
        None
    }

    async fn rule_resumption(
        &self,
        input: &str,
        ctx: &ClassificationContext,
    ) -> Option<ClassificationResult> {
        let lower = input.to_lowercase();
        if !RESUMPTION_CUES.iter().any(|cue| lower.contains(cue)) {
            return None;
        }

        // Candidate turns: recent turns plus the tail of the full history.
        let window = self.config.pattern_window;
        let history_tail = ctx
            .full_history
            .iter()
            .rev()
            .take(window)
            .map(String::as_str);
        let mut best = 0.0f64;
        for turn in ctx.recent_turns.iter().map(String::as_str).chain(history_tail) {
            let sim = self.similarity.similarity(input, turn).await;
            if sim > best {
                best = sim;
            }
        }

        if best > self.config.resumption_threshold {
            return Some(self.finish(Category::Resumption, 0.9, best, None, ctx));
        }
        None
    }

    async fn rule_contradiction(
        &self,
        input: &str,
        ctx: &ClassificationContext,
    ) -> Option<ClassificationResult> {
        let sentence = ctx.current_sentence.as_deref()?;
        if sentence.trim().is_empty() {
            return None;
        }
        if self.similarity.detects_contradiction(sentence, input).await {
            let sim = self.similarity.similarity(sentence, input).await;
            return Some(self.finish(Category::Contradiction, 0.85, sim, None, ctx));
        }
        None
    }

    async fn rule_cascade(&self, input: &str, ctx: &ClassificationContext) -> ClassificationResult {
        let current_sim = match ctx.current_sentence.as_deref() {
            Some(sentence) => self.similarity.similarity(sentence, input).await,
            None => 0.0,
        };
        let mut recent_sim = 0.0f64;
        for turn in &ctx.recent_turns {
            let sim = self.similarity.similarity(turn, input).await;
            if sim > recent_sim {
                recent_sim = sim;
            }
        }
        let max_sim = current_sim.max(recent_sim);

        let cfg = &self.config;
        if current_sim >= cfg.continuation_threshold {
            return self.finish(Category::Continuation, 0.9, current_sim, None, ctx);
        }
        if max_sim >= cfg.continuation_threshold {
            return self.finish(Category::RelatedShift, 0.85, max_sim, None, ctx);
        }
        if max_sim >= cfg.partial_threshold {
            return self.finish(Category::PartialShift, 0.75, max_sim, None, ctx);
        }
        if max_sim >= cfg.clarification_threshold && has_clarification_cue(input) {
            return self.finish(Category::Clarification, 0.8, max_sim, None, ctx);
        }
        if let Some((tag, confidence)) = detect_pattern(&ctx.full_history, cfg.pattern_window) {
            return self.finish(
                Category::PatternFollowUp,
                confidence,
                max_sim,
                Some(tag),
                ctx,
            );
        }
        self.finish(Category::NewTopic, 0.7, max_sim, None, ctx)
    }

    fn finish(
        &self,
        category: Category,
        confidence: f64,
        similarity: f64,
        pattern: Option<String>,
        ctx: &ClassificationContext,
    ) -> ClassificationResult {
        let entities = if category.is_shift() { ctx.entities() } else { None };
        let transition_phrase = self.transitions.select_transition(category, entities);
        ClassificationResult {
            category,
            confidence: clamp_unit(confidence),
            similarity: clamp_unit(similarity),
            transition_phrase,
            pattern,
        }
    }
}

fn has_clarification_cue(input: &str) -> bool {
    let lower = input.to_lowercase();
    CLARIFICATION_CUES.iter().any(|cue| lower.contains(cue))
}

/// Pattern heuristics over the last `window` history turns.
///
/// Either a run of questions (ratio of question-shaped turns at or above
/// 0.6) or a topic thread (consecutive turns whose non-stopword token sets
/// overlap by more than 0.5 Jaccard). Confidence is the observed ratio or
/// overlap. Known limitation: these are fixed heuristics, not NLU.
pub fn detect_pattern(history: &[String], window: usize) -> Option<(String, f64)> {
    let tail: Vec<&String> = history.iter().rev().take(window).rev().collect();
    if tail.len() < 2 {
        return None;
    }

    let question_count = tail
        .iter()
        .filter(|turn| {
            let trimmed = turn.trim();
            let lower = trimmed.to_lowercase();
            trimmed.ends_with('?')
                || QUESTION_OPENERS
                    .iter()
                    .any(|opener| lower.starts_with(&format!("{} ", opener)))
        })
        .count();
    let ratio = question_count as f64 / tail.len() as f64;
    if ratio >= 0.6 {
        return Some(("question_series".to_string(), clamp_unit(ratio)));
    }

    let mut best_overlap = 0.0f64;
    for pair in tail.windows(2) {
        let a: HashSet<String> = tokenize(pair[0]).into_iter().collect();
        let b: HashSet<String> = tokenize(pair[1]).into_iter().collect();
        if a.is_empty() || b.is_empty() {
            continue;
        }
        let overlap = a.intersection(&b).count() as f64 / a.union(&b).count() as f64;
        if overlap > best_overlap {
            best_overlap = overlap;
        }
    }
    if best_overlap > 0.5 {
        return Some(("topic_thread".to_string(), clamp_unit(best_overlap)));
    }

    None
}
