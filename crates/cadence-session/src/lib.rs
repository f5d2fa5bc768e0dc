//! Shared session state and speech interruption handling.

pub mod interruption;
pub mod state;

pub use interruption::InterruptionCoordinator;
pub use state::{InMemorySessionStore, SessionStateStore};
