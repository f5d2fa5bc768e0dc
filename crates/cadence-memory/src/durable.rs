//! Durable-tier collaborator contract.
//!
//! The durable tier is an external batch-insert store. Ordering and
//! partial-failure semantics are implementation-defined; the engine only
//! requires at-least-once delivery, relying on read-time dedup by
//! (timestamp, input prefix). A failed batch is re-queued whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use cadence_core::error::{CadenceError, Result};
use cadence_core::types::Interaction;

/// Higher-latency persistent archive for interaction records.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert a batch. All-or-nothing from the caller's perspective: any
    /// error means the whole batch will be retried later.
    async fn insert_many(&self, records: &[Interaction]) -> Result<()>;

    /// All archived records, in insertion order. Duplicates possible.
    async fn fetch_all(&self) -> Result<Vec<Interaction>>;
}

/// In-memory reference implementation, with failure injection for tests.
#[derive(Default)]
pub struct InMemoryDurableStore {
    records: Mutex<Vec<Interaction>>,
    fail_next: AtomicBool,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `insert_many` call fail once.
    pub fn fail_next_insert(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn insert_many(&self, records: &[Interaction]) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CadenceError::Memory("injected insert failure".to_string()));
        }
        let mut guard = self
            .records
            .lock()
            .map_err(|e| CadenceError::Memory(format!("durable lock poisoned: {}", e)))?;
        guard.extend(records.iter().cloned());
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Interaction>> {
        let guard = self
            .records
            .lock()
            .map_err(|e| CadenceError::Memory(format!("durable lock poisoned: {}", e)))?;
        Ok(guard.clone())
    }
}

/// Log-only stub: accepts every batch and archives nothing.
#[derive(Debug, Clone, Default)]
pub struct NullDurableStore;

#[async_trait]
impl DurableStore for NullDurableStore {
    async fn insert_many(&self, records: &[Interaction]) -> Result<()> {
        debug!(count = records.len(), "Durable tier stub: dropping batch");
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Interaction>> {
        Ok(Vec::new())
    }
}
