pub mod classifier;
pub mod similarity;
pub mod transition;

pub use classifier::{ClassificationContext, RelationshipClassifier, Rule, RULE_ORDER};
pub use similarity::SimilarityEngine;
pub use transition::TransitionSelector;
