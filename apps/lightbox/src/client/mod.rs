//! Event-driven client around the engine. Every external trigger (poll
//! completions, push events, navigation intents, host commands) becomes an
//! [`EngineEvent`] consumed by one dispatch task, which is the only writer
//! of engine state. Transport calls are spawned; their completions come back
//! through the same queue, tagged with the epoch they were issued under.

use crate::config::Config;
use crate::engine::{Projection, ViewerEngine};
use crate::history::{HistoryCoordinator, HistorySwitchError};
use crate::model::{ArtifactId, Epoch, GenerationParams, HistoryRecord};
use crate::nav::NavIntent;
use crate::protocol::{PushEvent, StatusSnapshot};
use crate::session::SessionState;
use crate::transport::{ArtifactStore, GenerationBackend, HistoryStore, PushEvents, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

pub mod intent;

#[derive(Debug)]
pub enum EngineEvent {
    Submit(GenerationParams),
    Stop,
    Resume,
    RequestMore(u32),
    Intent(NavIntent),
    DismissHint,
    DeleteCurrent,
    SwitchHistory(String),
    DeleteRecord(String),
    PollCompleted {
        epoch: Epoch,
        snapshot: StatusSnapshot,
    },
    PollFailed {
        epoch: Epoch,
        error: TransportError,
    },
    Push {
        epoch: Epoch,
        event: PushEvent,
    },
    HistoryFetched {
        epoch: Epoch,
        record_id: String,
        result: Result<(HistoryRecord, Vec<ArtifactId>), HistorySwitchError>,
    },
    Shutdown,
}

/// Cloneable host-side handle. All methods enqueue; none block or fail.
/// A send after the loop has shut down is dropped with a debug log.
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ClientHandle {
    fn send(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("client loop is gone; event dropped");
        }
    }

    pub fn submit(&self, params: GenerationParams) {
        self.send(EngineEvent::Submit(params));
    }

    pub fn stop(&self) {
        self.send(EngineEvent::Stop);
    }

    pub fn resume(&self) {
        self.send(EngineEvent::Resume);
    }

    pub fn request_more(&self, count: u32) {
        self.send(EngineEvent::RequestMore(count));
    }

    pub fn navigate(&self, intent: NavIntent) {
        self.send(EngineEvent::Intent(intent));
    }

    pub fn dismiss_hint(&self) {
        self.send(EngineEvent::DismissHint);
    }

    pub fn delete_current(&self) {
        self.send(EngineEvent::DeleteCurrent);
    }

    pub fn switch_history(&self, record_id: impl Into<String>) {
        self.send(EngineEvent::SwitchHistory(record_id.into()));
    }

    pub fn delete_record(&self, record_id: impl Into<String>) {
        self.send(EngineEvent::DeleteRecord(record_id.into()));
    }

    pub fn shutdown(&self) {
        self.send(EngineEvent::Shutdown);
    }
}

pub struct ViewerClient {
    engine: ViewerEngine,
    backend: Arc<dyn GenerationBackend>,
    artifacts: Arc<dyn ArtifactStore>,
    history: Arc<HistoryCoordinator>,
    push: Arc<dyn PushEvents>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<EngineEvent>>,
    projection_tx: watch::Sender<Projection>,
    epoch_mirror: Arc<AtomicU64>,
    poll_interval: Duration,
    poll_failing: bool,
}

impl ViewerClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        artifacts: Arc<dyn ArtifactStore>,
        history_store: Arc<dyn HistoryStore>,
        push: Arc<dyn PushEvents>,
        config: &Config,
    ) -> Self {
        let engine = ViewerEngine::new(config.hint_expiry);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (projection_tx, _) = watch::channel(engine.projection());
        Self {
            engine,
            backend,
            artifacts,
            history: Arc::new(HistoryCoordinator::new(history_store)),
            push,
            events_tx,
            events_rx: Some(events_rx),
            projection_tx,
            epoch_mirror: Arc::new(AtomicU64::new(0)),
            poll_interval: config.poll_interval,
            poll_failing: false,
        }
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            tx: self.events_tx.clone(),
        }
    }

    pub fn projection_rx(&self) -> watch::Receiver<Projection> {
        self.projection_tx.subscribe()
    }

    /// History listing handle for the host surface (the panel reads records
    /// directly; switching and deleting go through the event queue).
    pub fn history(&self) -> Arc<HistoryCoordinator> {
        self.history.clone()
    }

    /// Run the dispatch loop until `Shutdown`. Consumes the client; the
    /// poll loop and push listener are torn down on exit.
    pub async fn run(mut self) {
        let Some(mut events_rx) = self.events_rx.take() else {
            return;
        };
        let poll_task = self.spawn_poll_loop();
        let push_task = self.spawn_push_listener();

        while let Some(event) = events_rx.recv().await {
            if matches!(event, EngineEvent::Shutdown) {
                break;
            }
            self.dispatch(event);
            self.epoch_mirror
                .store(self.engine.epoch().0, Ordering::Release);
            self.projection_tx.send_replace(self.engine.projection());
        }

        poll_task.abort();
        push_task.abort();
    }

    fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Submit(params) => match self.engine.submit(params.clone()) {
                Ok(_) => self.spawn_start(params),
                Err(err) => warn!("submit rejected: {err}"),
            },
            EngineEvent::Stop => match self.engine.stop() {
                Ok(()) => {
                    let backend = self.backend.clone();
                    tokio::spawn(async move {
                        if let Err(err) = backend.request_stop().await {
                            warn!("stop request failed: {err}");
                        }
                    });
                }
                Err(err) => debug!("stop ignored: {err}"),
            },
            EngineEvent::Resume => match self.engine.resume() {
                Ok(()) => {
                    if let Some(params) = self.engine.params().cloned() {
                        self.spawn_start(params);
                    }
                }
                Err(err) => debug!("resume ignored: {err}"),
            },
            EngineEvent::RequestMore(count) => {
                if self.engine.session_state() == SessionState::Generating {
                    let backend = self.backend.clone();
                    tokio::spawn(async move {
                        if let Err(err) = backend.request_more(count).await {
                            warn!("request for more artifacts failed: {err}");
                        }
                    });
                } else {
                    debug!("ignoring request_more while not generating");
                }
            }
            EngineEvent::Intent(intent) => {
                self.engine.navigate(intent);
            }
            EngineEvent::DismissHint => self.engine.dismiss_hint(),
            EngineEvent::DeleteCurrent => match self.engine.delete_current() {
                Ok(id) => {
                    let store = self.artifacts.clone();
                    tokio::spawn(async move {
                        match store.delete_artifact(&id).await {
                            Ok(remaining) => debug!(
                                artifact = %id,
                                remaining = remaining.len(),
                                "artifact deletion confirmed"
                            ),
                            Err(err) => {
                                warn!(artifact = %id, "artifact deletion failed upstream: {err}")
                            }
                        }
                    });
                }
                Err(err) => debug!("delete ignored: {err}"),
            },
            EngineEvent::SwitchHistory(record_id) => {
                let epoch = self.history.begin(&mut self.engine);
                let history = self.history.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = history.fetch(&record_id).await;
                    let _ = tx.send(EngineEvent::HistoryFetched {
                        epoch,
                        record_id,
                        result,
                    });
                });
            }
            EngineEvent::HistoryFetched {
                epoch,
                record_id,
                result,
            } => match result {
                Ok((record, artifacts)) => {
                    if let Err(err) =
                        self.history
                            .complete(&mut self.engine, epoch, &record, artifacts)
                    {
                        debug!("history switch dropped: {err}");
                    }
                }
                Err(err) => {
                    warn!(record = %record_id, "history switch failed: {err}");
                    self.history
                        .fail(&mut self.engine, epoch, &record_id, &err);
                }
            },
            EngineEvent::DeleteRecord(record_id) => {
                if self.history.teardown(&mut self.engine, &record_id) {
                    debug!(record = %record_id, "tore down active session for deleted record");
                }
                let history = self.history.clone();
                tokio::spawn(async move {
                    history.delete_remote(record_id).await;
                });
            }
            EngineEvent::PollCompleted { epoch, snapshot } => {
                self.poll_failing = false;
                self.engine.ingest_poll(epoch, &snapshot);
            }
            EngineEvent::PollFailed { error, .. } => {
                // First failure is loud; the fixed-interval retry makes the
                // rest noise until one succeeds.
                if self.poll_failing {
                    debug!("status poll still failing: {error}");
                } else {
                    warn!("status poll failed, will retry: {error}");
                    self.poll_failing = true;
                }
            }
            EngineEvent::Push { epoch, event } => {
                self.engine.ingest_push(epoch, event);
            }
            EngineEvent::Shutdown => {}
        }
    }

    fn spawn_start(&self, params: GenerationParams) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.request_start(&params).await {
                warn!("start request failed: {err}");
            }
        });
    }

    fn spawn_poll_loop(&self) -> JoinHandle<()> {
        let backend = self.backend.clone();
        let tx = self.events_tx.clone();
        let epoch_mirror = self.epoch_mirror.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // A hung request simply delays the next effective tick.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let epoch = Epoch(epoch_mirror.load(Ordering::Acquire));
                let event = match backend.poll_status().await {
                    Ok(snapshot) => EngineEvent::PollCompleted { epoch, snapshot },
                    Err(error) => EngineEvent::PollFailed { epoch, error },
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_push_listener(&self) -> JoinHandle<()> {
        let push = self.push.clone();
        let tx = self.events_tx.clone();
        let epoch_mirror = self.epoch_mirror.clone();
        tokio::spawn(async move {
            let mut rx = match push.subscribe().await {
                Ok(rx) => rx,
                Err(err) => {
                    warn!("push channel unavailable, continuing poll-only: {err}");
                    return;
                }
            };
            while let Some(event) = rx.recv().await {
                let epoch = Epoch(epoch_mirror.load(Ordering::Acquire));
                if tx.send(EngineEvent::Push { epoch, event }).is_err() {
                    break;
                }
            }
            debug!("push channel closed; poll-only from here");
        })
    }
}
