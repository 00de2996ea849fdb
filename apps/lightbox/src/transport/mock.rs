//! In-memory transports: scripted implementations of the collaborator
//! contracts for integration tests and `--mock` runs against no server.

use crate::model::{ArtifactId, GenerationParams, HistoryRecord};
use crate::protocol::{PushEvent, StatusSnapshot};
use crate::transport::{
    ArtifactStore, GenerationBackend, HistoryStore, PushEvents, TransportError,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug)]
struct MockBackendState {
    running: bool,
    prompt: Option<String>,
    width: u32,
    height: u32,
    artifacts: Vec<ArtifactId>,
    scripted: VecDeque<Vec<ArtifactId>>,
    auto_generate: bool,
    generated: u64,
    fail_polls: bool,
}

impl Default for MockBackendState {
    fn default() -> Self {
        Self {
            running: false,
            prompt: None,
            width: crate::model::DEFAULT_WIDTH,
            height: crate::model::DEFAULT_HEIGHT,
            artifacts: Vec::new(),
            scripted: VecDeque::new(),
            auto_generate: false,
            generated: 0,
            fail_polls: false,
        }
    }
}

/// Scripted generation backend. Tests enqueue artifact batches with
/// [`MockBackend::script_batch`]; polls while running drain them into the
/// cumulative artifact list. With `auto_generate` on, every running poll
/// also fabricates one artifact, enough to drive the binary's `--mock` mode.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockBackendState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generative() -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().auto_generate = true;
        backend
    }

    /// Pre-seed backend state, as if a previous run left an active task.
    pub fn with_existing(prompt: &str, running: bool, artifacts: Vec<ArtifactId>) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.lock().unwrap();
            state.prompt = Some(prompt.to_string());
            state.running = running;
            state.generated = artifacts.len() as u64;
            state.artifacts = artifacts;
        }
        backend
    }

    pub fn script_batch(&self, ids: Vec<ArtifactId>) {
        self.state.lock().unwrap().scripted.push_back(ids);
    }

    pub fn set_fail_polls(&self, fail: bool) {
        self.state.lock().unwrap().fail_polls = fail;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn request_start(&self, params: &GenerationParams) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.prompt.as_deref() != Some(params.prompt.as_str()) {
            state.artifacts.clear();
            state.generated = 0;
        }
        state.prompt = Some(params.prompt.clone());
        state.width = params.width;
        state.height = params.height;
        state.running = true;
        Ok(())
    }

    async fn request_stop(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().running = false;
        Ok(())
    }

    async fn request_more(&self, _count: u32) -> Result<(), TransportError> {
        self.state.lock().unwrap().running = true;
        Ok(())
    }

    async fn poll_status(&self) -> Result<StatusSnapshot, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_polls {
            return Err(TransportError::Request("mock poll failure".to_string()));
        }
        if state.running {
            while let Some(batch) = state.scripted.pop_front() {
                state.generated += batch.len() as u64;
                state.artifacts.extend(batch);
            }
            if state.auto_generate {
                let next = ArtifactId(format!("mock-{:04}.png", state.generated + 1));
                state.generated += 1;
                state.artifacts.push(next);
            }
        }
        Ok(StatusSnapshot {
            running: state.running,
            generated_count: state.generated,
            artifacts: state.artifacts.clone(),
            current_prompt: state.prompt.clone(),
            width: state.width,
            height: state.height,
        })
    }

    async fn preset_prompt(&self) -> Result<Option<String>, TransportError> {
        Ok(Some("a lighthouse at dusk, oil on canvas".to_string()))
    }
}

/// Artifact store that records deletions and always confirms them.
#[derive(Debug, Default)]
pub struct MockArtifactStore {
    deleted: Mutex<Vec<ArtifactId>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted(&self) -> Vec<ArtifactId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn delete_artifact(&self, id: &ArtifactId) -> Result<Vec<ArtifactId>, TransportError> {
        self.deleted.lock().unwrap().push(id.clone());
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
struct MockHistoryState {
    records: Vec<(HistoryRecord, Vec<ArtifactId>)>,
    fail_fetch: bool,
}

#[derive(Debug, Default)]
pub struct MockHistoryStore {
    state: Mutex<MockHistoryState>,
}

impl MockHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: HistoryRecord, artifacts: Vec<ArtifactId>) {
        self.state.lock().unwrap().records.push((record, artifacts));
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetch = fail;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .any(|(record, _)| record.id == id)
    }
}

#[async_trait]
impl HistoryStore for MockHistoryStore {
    async fn list_records(&self) -> Result<Vec<HistoryRecord>, TransportError> {
        let state = self.state.lock().unwrap();
        Ok(state.records.iter().map(|(record, _)| record.clone()).collect())
    }

    async fn fetch_record(
        &self,
        id: &str,
    ) -> Result<(HistoryRecord, Vec<ArtifactId>), TransportError> {
        let state = self.state.lock().unwrap();
        if state.fail_fetch {
            return Err(TransportError::Request("mock fetch failure".to_string()));
        }
        state
            .records
            .iter()
            .find(|(record, _)| record.id == id)
            .cloned()
            .ok_or_else(|| TransportError::Rejected(format!("record {id} not found")))
    }

    async fn delete_record(&self, id: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.records.retain(|(record, _)| record.id != id);
        Ok(())
    }
}

/// Push channel fed by a test-held sender. `pair` hands back the sender;
/// `subscribe` hands out the receiver exactly once.
#[derive(Debug)]
pub struct MockPush {
    rx: Mutex<Option<mpsc::UnboundedReceiver<PushEvent>>>,
}

impl MockPush {
    pub fn pair() -> (Self, mpsc::UnboundedSender<PushEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    /// A push channel that always fails to connect, for poll-only tests.
    pub fn unavailable() -> Self {
        Self {
            rx: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PushEvents for MockPush {
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PushEvent>, TransportError> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Push("mock push unavailable".to_string()))
    }
}
