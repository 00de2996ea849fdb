use crate::engine::ViewerEngine;
use crate::model::{ArtifactId, Epoch, HistoryRecord};
use crate::transport::{HistoryStore, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HistorySwitchError {
    #[error("record fetch failed: {0}")]
    Fetch(#[from] TransportError),
    #[error("switch to {0} was overtaken by a newer session")]
    Overtaken(String),
}

/// Drives the transactional session swap: supersede first, then a single
/// fetch round-trip, then rebuild. A failed fetch leaves the previous
/// session superseded; the caller owns any retry. Record deletion is
/// optimistic: local teardown happens before the store confirms, and the
/// confirmation is fire-and-forget.
pub struct HistoryCoordinator {
    store: Arc<dyn HistoryStore>,
}

impl HistoryCoordinator {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<HistoryRecord>, TransportError> {
        self.store.list_records().await
    }

    /// Phase one: supersede the active session and advance the epoch so
    /// late completions for it are dropped.
    pub fn begin(&self, engine: &mut ViewerEngine) -> Epoch {
        engine.begin_switch()
    }

    /// The single round-trip of the switch. Runs without holding the engine.
    pub async fn fetch(
        &self,
        record_id: &str,
    ) -> Result<(HistoryRecord, Vec<ArtifactId>), HistorySwitchError> {
        Ok(self.store.fetch_record(record_id).await?)
    }

    /// Phase two: install the fetched session, unless a newer submit or
    /// switch advanced the epoch while the fetch was in flight.
    pub fn complete(
        &self,
        engine: &mut ViewerEngine,
        epoch: Epoch,
        record: &HistoryRecord,
        artifacts: Vec<ArtifactId>,
    ) -> Result<(), HistorySwitchError> {
        if engine.complete_switch(epoch, record, artifacts) {
            Ok(())
        } else {
            Err(HistorySwitchError::Overtaken(record.id.clone()))
        }
    }

    /// Record a failed switch on the engine so the host can offer a retry.
    pub fn fail(&self, engine: &mut ViewerEngine, epoch: Epoch, record_id: &str, err: &HistorySwitchError) {
        engine.fail_switch(epoch, record_id, &err.to_string());
    }

    /// Optimistic local teardown when the active session's record is
    /// deleted. Returns whether the engine state was torn down.
    pub fn teardown(&self, engine: &mut ViewerEngine, record_id: &str) -> bool {
        engine.teardown_record(record_id)
    }

    /// Fire-and-forget remote deletion; a failure is logged, never rolled
    /// back locally.
    pub async fn delete_remote(&self, record_id: String) {
        if let Err(err) = self.store.delete_record(&record_id).await {
            warn!(record = %record_id, "history record deletion failed: {err}");
        }
    }
}
