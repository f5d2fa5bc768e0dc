//! Spoken transition phrase selection.
//!
//! Each category has a pool of candidate phrases. A FIFO of the last phrases
//! used across all categories keeps narration from repeating itself; when
//! filtering empties a pool the full pool is reused.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;

use cadence_core::types::Category;

/// Plain candidate phrases per category. Every category keeps at least four.
fn phrase_pool(category: Category) -> &'static [&'static str] {
    match category {
        Category::Continuation => &[
            "Continuing on,",
            "To keep going,",
            "Picking up where we were,",
            "Staying with that,",
        ],
        Category::RelatedShift => &[
            "On a related note,",
            "That connects to something nearby,",
            "Switching tracks slightly,",
            "Moving to a neighboring topic,",
        ],
        Category::PartialShift => &[
            "Branching off a little,",
            "Taking a slight detour,",
            "That partly relates, so,",
            "Stepping sideways for a moment,",
        ],
        Category::PatternFollowUp => &[
            "Following the same thread,",
            "Keeping with the pattern,",
            "In the same vein,",
            "As before,",
        ],
        Category::Clarification => &[
            "Let me clarify that.",
            "To explain further,",
            "Here's more detail.",
            "Let me expand on that.",
        ],
        Category::NewTopic => &[
            "On a different note,",
            "Turning to something new,",
            "Changing gears,",
            "Let's look at something else.",
        ],
        Category::Resumption => &[
            "Getting back to what we discussed,",
            "Returning to the earlier topic,",
            "Picking that back up,",
            "As we were saying before,",
        ],
        Category::Contradiction => &[
            "Let me revisit that point.",
            "That's a fair challenge.",
            "Taking that pushback on board,",
            "Let me reconsider that.",
        ],
        Category::Opening => &[
            "Let's get started.",
            "Alright.",
            "Here we go.",
            "Let's dive in.",
        ],
    }
}

/// Entity-aware templates for shift categories. Joined into the candidate
/// pool only when both the previous and new entity names are known;
/// `{prev}` and `{new}` are interpolated after selection.
fn entity_pool(category: Category) -> &'static [&'static str] {
    match category {
        Category::RelatedShift => &[
            "Moving from {prev} to {new},",
            "Shifting over to {new},",
        ],
        Category::PartialShift => &[
            "That touches on {new},",
            "Partly leaving {prev} behind,",
        ],
        Category::NewTopic => &[
            "Setting {prev} aside, let's talk about {new}.",
            "Let's change gears to {new}.",
        ],
        _ => &[],
    }
}

/// Picks non-repeating transition phrases.
pub struct TransitionSelector {
    /// Templates used most recently, across all categories, oldest first.
    recent: Mutex<VecDeque<&'static str>>,
    window: usize,
}

impl TransitionSelector {
    pub fn new(window: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
            window,
        }
    }

    /// Select a phrase for the category.
    ///
    /// `entities` carries (previous, new) topic entity names; for shift
    /// categories with both known, entity-aware templates join the pool and
    /// placeholders are interpolated.
    pub fn select_transition(
        &self,
        category: Category,
        entities: Option<(&str, &str)>,
    ) -> String {
        let mut pool: Vec<&'static str> = phrase_pool(category).to_vec();
        if category.is_shift() && entities.is_some() {
            pool.extend_from_slice(entity_pool(category));
        }

        let mut recent = match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let fresh: Vec<&'static str> = pool
            .iter()
            .copied()
            .filter(|p| !recent.contains(p))
            .collect();
        let candidates = if fresh.is_empty() { &pool } else { &fresh };

        let idx = rand::rng().random_range(0..candidates.len());
        let template = candidates[idx];

        recent.push_back(template);
        while recent.len() > self.window {
            recent.pop_front();
        }
        drop(recent);

        match entities {
            Some((prev, new)) if category.is_shift() => template
                .replace("{prev}", prev)
                .replace("{new}", new),
            _ => template.to_string(),
        }
    }
}
