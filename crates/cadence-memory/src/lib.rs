//! Tiered conversation memory: durable archive, fast tier with background
//! summarization, and multi-signal retrieval.

pub mod durable;
pub mod retriever;
pub mod store;

pub use durable::{DurableStore, InMemoryDurableStore, NullDurableStore};
pub use retriever::{MemoryRetriever, RankedCandidate, RetrievalWeights};
pub use store::MemoryStore;
