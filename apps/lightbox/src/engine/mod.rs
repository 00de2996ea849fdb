use crate::feed::{Feed, FeedError};
use crate::model::{ArtifactId, Epoch, GenerationParams, HistoryRecord};
use crate::nav::{EdgeSignal, NavIntent, NavOutcome, Navigator};
use crate::protocol::{PushEvent, PushPhase, StatusSnapshot};
use crate::session::{SessionError, SessionMachine, SessionState};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Push log lines retained before the oldest are dropped.
const LOG_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("no artifact selected")]
    NoSelection,
}

/// Read-only projection for the hosting surface, recomputed after every
/// mutation. The host renders from this and never touches engine fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub session_state: SessionState,
    pub prompt: Option<String>,
    pub generated_count: u64,
    pub feed_len: usize,
    pub cursor: Option<usize>,
    pub current: Option<ArtifactId>,
    pub last_edge: Option<EdgeSignal>,
    pub phase: Option<PushPhase>,
    pub hint_visible: bool,
    pub last_error: Option<String>,
    pub log_tail: Vec<String>,
}

/// The one owner of Session, Feed, and NavigationCursor for the active
/// session. Every mutation funnels through a method here; completions of
/// async work carry the epoch they were issued under and are dropped when
/// it no longer matches.
#[derive(Debug)]
pub struct ViewerEngine {
    session: SessionMachine,
    feed: Feed,
    nav: Navigator,
    epoch: Epoch,
    phase: Option<PushPhase>,
    log: VecDeque<String>,
    last_edge: Option<EdgeSignal>,
    last_error: Option<String>,
    hint_expiry: Duration,
}

impl ViewerEngine {
    pub fn new(hint_expiry: Duration) -> Self {
        Self {
            session: SessionMachine::new(),
            feed: Feed::new(),
            nav: Navigator::new(),
            epoch: Epoch::ZERO,
            phase: None,
            log: VecDeque::new(),
            last_edge: None,
            last_error: None,
            hint_expiry,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn params(&self) -> Option<&GenerationParams> {
        self.session.params()
    }

    /// Active session's originating history record, when it came from one.
    pub fn record_id(&self) -> Option<&str> {
        self.session.record_id()
    }

    /// Submit a prompt. A changed prompt replaces the feed, cursor, log, and
    /// epoch; resubmitting the active prompt restarts generation in place.
    pub fn submit(&mut self, params: GenerationParams) -> Result<Epoch, EngineError> {
        if params.prompt.trim().is_empty() {
            return Err(self.fail(SessionError::EmptyPrompt.into()));
        }
        if self.session.state() == SessionState::Superseded {
            self.session = SessionMachine::new();
        }
        let outcome = match self.session.start(params) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail(err.into())),
        };
        if outcome.prompt_changed {
            self.replace_feed(Feed::new(), Navigator::new());
            self.epoch = self.epoch.next();
        }
        self.settle();
        Ok(self.epoch)
    }

    /// Resume a stopped session. Feed and cursor are untouched.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        match self.session.resume() {
            Ok(()) => {
                self.settle();
                Ok(())
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        match self.session.stop() {
            Ok(()) => {
                self.settle();
                Ok(())
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Apply a poll completion. Returns false when the completion was issued
    /// under a superseded epoch and was dropped.
    pub fn ingest_poll(&mut self, epoch: Epoch, snapshot: &StatusSnapshot) -> bool {
        if epoch != self.epoch {
            debug!(stale = %epoch, current = %self.epoch, "dropping stale poll completion");
            return false;
        }
        match self.session.state() {
            SessionState::Superseded => return false,
            SessionState::Idle => {
                if snapshot.current_prompt.is_some() || !snapshot.artifacts.is_empty() {
                    self.restore_from_status(snapshot);
                }
                return true;
            }
            _ => {}
        }
        // The backend reports which prompt its snapshot belongs to. A poll
        // that raced a submit (or a switch the service has not caught up
        // with) carries the wrong prompt and must not stop the session or
        // leak another task's artifacts into this feed.
        if snapshot.current_prompt.as_deref() != self.session.prompt() {
            debug!("dropping status snapshot for a different prompt");
            return true;
        }
        self.session
            .apply_poll(snapshot.running, snapshot.generated_count);
        let outcome = self.feed.ingest_snapshot(&snapshot.artifacts);
        self.nav
            .on_append(outcome, self.feed.len(), Instant::now());
        if outcome.appended > 0 {
            // New artifacts invalidate both the waiting indicator and any
            // "no more" edge message still on screen.
            self.phase = None;
            self.last_edge = None;
        }
        true
    }

    /// Apply a push completion. Push never mutates the feed; phase events
    /// update the waiting indicator and log lines land in the ring buffer.
    pub fn ingest_push(&mut self, epoch: Epoch, event: PushEvent) -> bool {
        if epoch != self.epoch {
            debug!(stale = %epoch, current = %self.epoch, "dropping stale push event");
            return false;
        }
        if self.session.state() == SessionState::Superseded {
            return false;
        }
        match event {
            PushEvent::Status { status, detail } => {
                self.phase = Some(status);
                if status == PushPhase::Error {
                    let line = detail.unwrap_or_else(|| "generation error".to_string());
                    self.push_log(format!("error: {line}"));
                }
            }
            PushEvent::Log { line } => self.push_log(line),
        }
        true
    }

    pub fn navigate(&mut self, intent: NavIntent) -> NavOutcome {
        let still_generating = self.session.state() == SessionState::Generating;
        let outcome = self.nav.apply(intent, self.feed.len(), still_generating);
        self.last_edge = match outcome {
            NavOutcome::Edge(signal) => Some(signal),
            _ => None,
        };
        outcome
    }

    pub fn dismiss_hint(&mut self) {
        self.nav.dismiss_hint();
    }

    /// Remove one artifact by id: local, optimistic, reconciled against later
    /// snapshots by the feed's tombstones. Returns the removed display index.
    pub fn remove_artifact(&mut self, id: &ArtifactId) -> Result<usize, EngineError> {
        match self.feed.remove(id) {
            Ok(index) => {
                self.nav.on_remove(index, self.feed.len());
                self.settle();
                Ok(index)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Remove the artifact under the cursor, returning its id so the caller
    /// can confirm the deletion with the external store.
    pub fn delete_current(&mut self) -> Result<ArtifactId, EngineError> {
        let Some(artifact) = self.nav.cursor().and_then(|i| self.feed.get(i)) else {
            return Err(self.fail(EngineError::NoSelection));
        };
        let id = artifact.id.clone();
        self.remove_artifact(&id)?;
        Ok(id)
    }

    /// First half of a history switch: supersede the current session and
    /// advance the epoch so in-flight completions are dropped. The feed stays
    /// visible until the fetched replacement arrives.
    pub fn begin_switch(&mut self) -> Epoch {
        self.session.supersede();
        self.epoch = self.epoch.next();
        self.settle();
        self.epoch
    }

    /// Second half of a history switch. Returns false when a newer submit or
    /// switch advanced the epoch while the fetch was in flight.
    pub fn complete_switch(
        &mut self,
        epoch: Epoch,
        record: &HistoryRecord,
        artifacts: Vec<ArtifactId>,
    ) -> bool {
        if epoch != self.epoch {
            debug!(stale = %epoch, current = %self.epoch, "dropping overtaken history switch");
            return false;
        }
        let params = GenerationParams::new(record.prompt.clone())
            .with_size(record.width, record.height);
        let generated = artifacts.len() as u64;
        self.session = SessionMachine::from_record(record.id.clone(), params, generated);
        let feed = Feed::seeded(artifacts);
        let nav = Navigator::seeded(feed.len());
        self.replace_feed(feed, nav);
        self.settle();
        true
    }

    /// Record a failed history switch so the host can offer a retry. Only
    /// applies while the epoch that started the switch is still current.
    pub fn fail_switch(&mut self, epoch: Epoch, record_id: &str, message: &str) {
        if epoch != self.epoch {
            return;
        }
        self.last_error = Some(format!("history switch to {record_id} failed: {message}"));
    }

    /// Optimistic teardown for a deleted history record. When the record
    /// backs the active session, the engine returns to the empty state before
    /// the external deletion confirms.
    pub fn teardown_record(&mut self, record_id: &str) -> bool {
        if self.session.record_id() != Some(record_id) {
            return false;
        }
        self.session.supersede();
        self.epoch = self.epoch.next();
        self.replace_feed(Feed::new(), Navigator::new());
        self.settle();
        true
    }

    pub fn projection(&self) -> Projection {
        let snapshot = self.session.snapshot();
        let cursor = self.nav.cursor();
        Projection {
            session_state: snapshot.state,
            prompt: snapshot.prompt,
            generated_count: snapshot.generated_count,
            feed_len: self.feed.len(),
            cursor,
            current: cursor.and_then(|i| self.feed.get(i)).map(|a| a.id.clone()),
            last_edge: self.last_edge,
            phase: self.phase,
            hint_visible: self.nav.hint_visible(Instant::now(), self.hint_expiry),
            last_error: self.last_error.clone(),
            log_tail: self.log.iter().cloned().collect(),
        }
    }

    fn restore_from_status(&mut self, snapshot: &StatusSnapshot) {
        let prompt = snapshot.current_prompt.clone().unwrap_or_default();
        let params =
            GenerationParams::new(prompt).with_size(snapshot.width, snapshot.height);
        self.session =
            SessionMachine::restore(params, snapshot.running, snapshot.generated_count);
        let outcome = self.feed.ingest_snapshot(&snapshot.artifacts);
        self.nav
            .on_append(outcome, self.feed.len(), Instant::now());
    }

    fn replace_feed(&mut self, feed: Feed, nav: Navigator) {
        self.feed = feed;
        self.nav = nav;
        self.log.clear();
        self.phase = None;
    }

    fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    fn settle(&mut self) {
        self.last_edge = None;
        self.last_error = None;
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        self.last_error = Some(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::EdgeDirection;

    const HINT_EXPIRY: Duration = Duration::from_secs(6);

    fn engine() -> ViewerEngine {
        ViewerEngine::new(HINT_EXPIRY)
    }

    fn params(prompt: &str) -> GenerationParams {
        GenerationParams::new(prompt).with_size(800, 1200)
    }

    fn snapshot_for(prompt: &str, running: bool, names: &[&str]) -> StatusSnapshot {
        StatusSnapshot {
            running,
            generated_count: names.len() as u64,
            artifacts: names.iter().map(|n| ArtifactId::from(*n)).collect(),
            current_prompt: Some(prompt.to_string()),
            width: 800,
            height: 1200,
        }
    }

    fn snapshot(running: bool, names: &[&str]) -> StatusSnapshot {
        snapshot_for("P", running, names)
    }

    fn assert_cursor_valid(engine: &ViewerEngine) {
        let projection = engine.projection();
        match projection.cursor {
            None => assert_eq!(projection.feed_len, 0),
            Some(cursor) => assert!(cursor < projection.feed_len),
        }
    }

    #[test]
    fn end_to_end_generation_scenario() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();

        assert!(engine.ingest_poll(epoch, &snapshot(true, &["a1"])));
        let projection = engine.projection();
        assert_eq!(projection.feed_len, 1);
        assert_eq!(projection.cursor, Some(0));
        assert!(!projection.hint_visible);

        assert!(engine.ingest_poll(epoch, &snapshot(true, &["a1", "a2", "a3"])));
        let projection = engine.projection();
        assert_eq!(projection.feed_len, 3);
        assert_eq!(projection.cursor, Some(0));
        assert!(projection.hint_visible);

        assert_eq!(engine.navigate(NavIntent::Next), NavOutcome::Moved(1));
        assert_eq!(engine.navigate(NavIntent::Next), NavOutcome::Moved(2));

        engine.stop().unwrap();
        let outcome = engine.navigate(NavIntent::Next);
        assert_eq!(
            outcome,
            NavOutcome::Edge(EdgeSignal {
                direction: EdgeDirection::Forward,
                still_generating: false,
            })
        );
        let projection = engine.projection();
        assert_eq!(projection.cursor, Some(2));
        assert_eq!(
            projection.last_edge,
            Some(EdgeSignal {
                direction: EdgeDirection::Forward,
                still_generating: false,
            })
        );
        assert_cursor_valid(&engine);
    }

    #[test]
    fn ingesting_same_snapshot_twice_is_a_noop() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        let status = snapshot(true, &["a1", "a2"]);
        engine.ingest_poll(epoch, &status);
        let before = engine.projection();
        engine.ingest_poll(epoch, &status);
        assert_eq!(engine.projection(), before);
    }

    #[test]
    fn auto_reveal_happens_once() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a1"]));
        assert_eq!(engine.projection().cursor, Some(0));

        engine.navigate(NavIntent::Next);
        engine.ingest_poll(epoch, &snapshot(true, &["a1", "a2", "a3"]));
        assert_eq!(engine.projection().cursor, Some(0));
        engine.navigate(NavIntent::Next);
        engine.ingest_poll(epoch, &snapshot(true, &["a1", "a2", "a3", "a4"]));
        assert_eq!(engine.projection().cursor, Some(1));
    }

    #[test]
    fn delete_adjustment_keeps_selection() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a", "b", "c"]));
        engine.navigate(NavIntent::Last);
        assert_eq!(engine.projection().cursor, Some(2));

        engine.remove_artifact(&ArtifactId::from("b")).unwrap();
        let projection = engine.projection();
        assert_eq!(projection.feed_len, 2);
        assert_eq!(projection.cursor, Some(1));
        assert_eq!(projection.current, Some(ArtifactId::from("c")));
        assert_cursor_valid(&engine);
    }

    #[test]
    fn delete_current_returns_the_selected_id() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a", "b"]));
        engine.navigate(NavIntent::Last);
        assert_eq!(engine.delete_current().unwrap(), ArtifactId::from("b"));
        assert_eq!(engine.projection().cursor, Some(0));

        assert_eq!(engine.delete_current().unwrap(), ArtifactId::from("a"));
        let projection = engine.projection();
        assert_eq!(projection.feed_len, 0);
        assert_eq!(projection.cursor, None);
        assert_eq!(engine.delete_current(), Err(EngineError::NoSelection));
    }

    #[test]
    fn epoch_isolation_drops_stale_poll() {
        let mut engine = engine();
        let old_epoch = engine.submit(params("X")).unwrap();
        engine.ingest_poll(old_epoch, &snapshot_for("X", true, &["x1"]));

        let new_epoch = engine.begin_switch();
        let record = HistoryRecord {
            id: "rec-y".to_string(),
            prompt: "Y".to_string(),
            width: 800,
            height: 1200,
            artifact_count: 2,
        };
        assert!(engine.complete_switch(
            new_epoch,
            &record,
            vec![ArtifactId::from("y1"), ArtifactId::from("y2")],
        ));

        // A slow poll for the superseded session must not touch Y's feed.
        assert!(!engine.ingest_poll(old_epoch, &snapshot_for("X", true, &["x1", "x2", "x3"])));
        let projection = engine.projection();
        assert_eq!(projection.feed_len, 2);
        assert_eq!(projection.prompt.as_deref(), Some("Y"));
        assert_eq!(projection.session_state, SessionState::Stopped);
        assert_eq!(projection.cursor, Some(0));
    }

    #[test]
    fn overtaken_switch_completion_is_dropped() {
        let mut engine = engine();
        let first = engine.begin_switch();
        let second = engine.begin_switch();
        assert_ne!(first, second);

        let record = HistoryRecord {
            id: "rec-a".to_string(),
            prompt: "A".to_string(),
            width: 800,
            height: 1200,
            artifact_count: 0,
        };
        assert!(!engine.complete_switch(first, &record, vec![]));
        assert_eq!(engine.session_state(), SessionState::Superseded);
    }

    #[test]
    fn stop_then_resume_preserves_feed_and_cursor() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a", "b"]));
        engine.navigate(NavIntent::Next);

        engine.stop().unwrap();
        assert_eq!(engine.session_state(), SessionState::Stopped);
        engine.resume().unwrap();
        assert_eq!(engine.session_state(), SessionState::Generating);

        let projection = engine.projection();
        assert_eq!(projection.feed_len, 2);
        assert_eq!(projection.cursor, Some(1));
    }

    #[test]
    fn late_poll_after_stop_keeps_state_stopped_but_appends() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a"]));
        engine.stop().unwrap();

        engine.ingest_poll(epoch, &snapshot(true, &["a", "b"]));
        let projection = engine.projection();
        assert_eq!(projection.session_state, SessionState::Stopped);
        assert_eq!(projection.feed_len, 2);
    }

    #[test]
    fn resubmitting_same_prompt_keeps_feed_and_epoch() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a"]));
        engine.stop().unwrap();

        let again = engine.submit(params("P")).unwrap();
        assert_eq!(again, epoch);
        assert_eq!(engine.projection().feed_len, 1);
    }

    #[test]
    fn new_prompt_clears_feed_and_bumps_epoch() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a"]));

        let next = engine.submit(params("Q")).unwrap();
        assert_ne!(next, epoch);
        let projection = engine.projection();
        assert_eq!(projection.feed_len, 0);
        assert_eq!(projection.cursor, None);
        assert!(projection.log_tail.is_empty());
    }

    #[test]
    fn empty_prompt_is_rejected_and_surfaced() {
        let mut engine = engine();
        assert_eq!(
            engine.submit(params("  ")),
            Err(EngineError::Session(SessionError::EmptyPrompt))
        );
        let projection = engine.projection();
        assert_eq!(projection.session_state, SessionState::Idle);
        assert!(projection.last_error.is_some());
    }

    #[test]
    fn push_updates_phase_and_log_but_not_feed() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        assert!(engine.ingest_push(
            epoch,
            PushEvent::Status {
                status: PushPhase::Rendering,
                detail: None,
            },
        ));
        assert!(engine.ingest_push(
            epoch,
            PushEvent::Log {
                line: "sampler step 1".to_string(),
            },
        ));
        let projection = engine.projection();
        assert_eq!(projection.phase, Some(PushPhase::Rendering));
        assert_eq!(projection.log_tail, vec!["sampler step 1".to_string()]);
        assert_eq!(projection.feed_len, 0);

        // Stale push events are dropped after the session is replaced.
        engine.submit(params("Q")).unwrap();
        assert!(!engine.ingest_push(
            epoch,
            PushEvent::Log {
                line: "late".to_string(),
            },
        ));
    }

    #[test]
    fn first_artifact_clears_waiting_phase() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_push(
            epoch,
            PushEvent::Status {
                status: PushPhase::Queued,
                detail: None,
            },
        );
        engine.ingest_poll(epoch, &snapshot(true, &["a"]));
        assert_eq!(engine.projection().phase, None);
    }

    #[test]
    fn failed_switch_surfaces_error_without_restoring() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        engine.ingest_poll(epoch, &snapshot(true, &["a"]));

        let switch_epoch = engine.begin_switch();
        engine.fail_switch(switch_epoch, "rec-9", "store unreachable");
        let projection = engine.projection();
        assert_eq!(projection.session_state, SessionState::Superseded);
        assert!(
            projection
                .last_error
                .as_deref()
                .unwrap()
                .contains("rec-9")
        );
    }

    #[test]
    fn teardown_applies_only_to_the_active_record() {
        let mut engine = engine();
        let record = HistoryRecord {
            id: "rec-a".to_string(),
            prompt: "A".to_string(),
            width: 800,
            height: 1200,
            artifact_count: 1,
        };
        let epoch = engine.begin_switch();
        engine.complete_switch(epoch, &record, vec![ArtifactId::from("a1")]);

        assert!(!engine.teardown_record("rec-other"));
        assert_eq!(engine.projection().feed_len, 1);

        assert!(engine.teardown_record("rec-a"));
        let projection = engine.projection();
        assert_eq!(projection.session_state, SessionState::Superseded);
        assert_eq!(projection.feed_len, 0);
        assert_eq!(projection.cursor, None);
    }

    #[test]
    fn submit_after_teardown_starts_fresh() {
        let mut engine = engine();
        let record = HistoryRecord {
            id: "rec-a".to_string(),
            prompt: "A".to_string(),
            width: 800,
            height: 1200,
            artifact_count: 0,
        };
        let epoch = engine.begin_switch();
        engine.complete_switch(epoch, &record, vec![]);
        engine.teardown_record("rec-a");

        let fresh = engine.submit(params("B")).unwrap();
        assert_eq!(engine.session_state(), SessionState::Generating);
        assert!(fresh > epoch);
    }

    #[test]
    fn poll_for_a_different_prompt_is_ignored() {
        let mut engine = engine();
        let epoch = engine.submit(params("P")).unwrap();
        // The poll raced the start request; the backend still reports the
        // previous task.
        engine.ingest_poll(epoch, &snapshot_for("old prompt", false, &["stale1"]));
        let projection = engine.projection();
        assert_eq!(projection.session_state, SessionState::Generating);
        assert_eq!(projection.feed_len, 0);
    }

    #[test]
    fn restore_from_cold_start_poll() {
        let mut engine = engine();
        let mut status = snapshot(true, &["a1", "a2"]);
        status.current_prompt = Some("P".to_string());

        assert!(engine.ingest_poll(engine.epoch(), &status));
        let projection = engine.projection();
        assert_eq!(projection.session_state, SessionState::Generating);
        assert_eq!(projection.prompt.as_deref(), Some("P"));
        assert_eq!(projection.feed_len, 2);
        assert_eq!(projection.cursor, Some(0));
    }

    #[test]
    fn idle_engine_ignores_empty_status() {
        let mut engine = engine();
        assert!(engine.ingest_poll(engine.epoch(), &StatusSnapshot::idle()));
        assert_eq!(engine.session_state(), SessionState::Idle);
        assert_eq!(engine.projection().feed_len, 0);
    }
}
