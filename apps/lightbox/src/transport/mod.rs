//! Collaborator contracts consumed by the engine. Implementations live in
//! the sibling modules; everything here is boundary shape, not behavior.

use crate::model::{ArtifactId, GenerationParams, HistoryRecord};
use crate::protocol::{PushEvent, StatusSnapshot};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod http;
pub mod mock;
pub mod websocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend rejected the call: {0}")]
    Rejected(String),
    #[error("unexpected payload: {0}")]
    Decode(String),
    #[error("push channel unavailable: {0}")]
    Push(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Generation backend: accepts a request and reports artifacts over time
/// through the status poll, which is the sole source of feed content.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn request_start(&self, params: &GenerationParams) -> Result<(), TransportError>;
    async fn request_stop(&self) -> Result<(), TransportError>;
    async fn request_more(&self, count: u32) -> Result<(), TransportError>;
    async fn poll_status(&self) -> Result<StatusSnapshot, TransportError>;
    async fn preset_prompt(&self) -> Result<Option<String>, TransportError>;
}

/// Artifact storage. Deletion returns the backend's view of the remaining
/// list, which the engine treats as advisory only; local state wins.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn delete_artifact(&self, id: &ArtifactId) -> Result<Vec<ArtifactId>, TransportError>;
}

/// History records: independent lifecycle, arbitrated by the external store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn list_records(&self) -> Result<Vec<HistoryRecord>, TransportError>;
    async fn fetch_record(
        &self,
        id: &str,
    ) -> Result<(HistoryRecord, Vec<ArtifactId>), TransportError>;
    async fn delete_record(&self, id: &str) -> Result<(), TransportError>;
}

/// Push channel: phase/log signaling only, never feed content. A closed
/// receiver means poll-only operation from then on.
#[async_trait]
pub trait PushEvents: Send + Sync {
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PushEvent>, TransportError>;
}
