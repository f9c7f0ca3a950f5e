use std::sync::Arc;

use ethereal_core::{DesiredRecord, EtherealResult, RecordStatus, StateStore};
use tracing::info;

/// Next counter value: the first observation initialises to 0, later
/// corrections add one.
pub fn next_resurrections(current: Option<u64>) -> u64 {
    match current {
        None => 0,
        Some(n) => n.saturating_add(1),
    }
}

/// Persists the resurrection counter, once per corrective action.
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn StateStore>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Write the next counter value against the version `record` was read at.
    /// A concurrent change surfaces as `Conflict`; it is not retried here.
    pub async fn record_correction(&self, record: &DesiredRecord) -> EtherealResult<DesiredRecord> {
        let current = record.resurrections();
        let next = next_resurrections(current);
        match current {
            None => info!(record = %record.name, resurrections = next, "first observation; initialising counter"),
            Some(prev) => info!(record = %record.name, from = prev, to = next, "instance resurrected"),
        }
        let status = RecordStatus { resurrections: Some(next) };
        self.store.patch_status(record, &status).await
    }
}
