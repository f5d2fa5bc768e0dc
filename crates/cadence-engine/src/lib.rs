//! Top-level turn orchestration for the Cadence engine.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, ProcessOutcome, RequestContext};
