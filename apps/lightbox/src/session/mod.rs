use crate::model::GenerationParams;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("session was superseded")]
    Stale,
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Generating,
    Stopped,
    Superseded,
}

/// Outcome of a successful `start`. A changed prompt obliges the engine to
/// clear the feed, cursor, and log before the first poll lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub prompt_changed: bool,
}

/// Observable state exposed to the presentation layer on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub prompt: Option<String>,
    pub generated_count: u64,
}

/// Lifecycle of one generation session:
/// `Idle → Generating → Stopped ⇄ Generating → Superseded`.
///
/// `Superseded` is terminal; a superseded machine rejects every further
/// intent. The machine owns the prompt and dimensions but not the feed:
/// poll results update the running flag and count here while feed content
/// flows through the reconciler.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    params: Option<GenerationParams>,
    generated_count: u64,
    record_id: Option<String>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            params: None,
            generated_count: 0,
            record_id: None,
        }
    }

    /// Rebuild a machine from a history record fetch. Switching never resumes
    /// generation, so the machine lands in `Stopped`.
    pub fn from_record(
        record_id: impl Into<String>,
        params: GenerationParams,
        generated_count: u64,
    ) -> Self {
        Self {
            state: SessionState::Stopped,
            params: Some(params),
            generated_count,
            record_id: Some(record_id.into()),
        }
    }

    /// Rebuild a machine from a cold-start status poll that reports an
    /// already-active backend task.
    pub fn restore(params: GenerationParams, running: bool, generated_count: u64) -> Self {
        let state = if running {
            SessionState::Generating
        } else if params.prompt.trim().is_empty() {
            SessionState::Idle
        } else {
            SessionState::Stopped
        };
        Self {
            state,
            params: Some(params),
            generated_count,
            record_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn prompt(&self) -> Option<&str> {
        self.params.as_ref().map(|p| p.prompt.as_str())
    }

    pub fn params(&self) -> Option<&GenerationParams> {
        self.params.as_ref()
    }

    pub fn generated_count(&self) -> u64 {
        self.generated_count
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            prompt: self.params.as_ref().map(|p| p.prompt.clone()),
            generated_count: self.generated_count,
        }
    }

    /// Begin generating. Valid from `Idle`, `Stopped`, or `Generating`; an
    /// empty prompt fails without any state change.
    pub fn start(&mut self, mut params: GenerationParams) -> Result<StartOutcome, SessionError> {
        if self.state == SessionState::Superseded {
            return Err(SessionError::Stale);
        }
        params.prompt = params.prompt.trim().to_string();
        if params.prompt.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        let prompt_changed = self.prompt() != Some(params.prompt.as_str());
        if prompt_changed {
            self.generated_count = 0;
            self.record_id = None;
        }
        self.params = Some(params);
        self.state = SessionState::Generating;
        Ok(StartOutcome { prompt_changed })
    }

    /// Re-enter `Generating` with the existing prompt. Only valid from
    /// `Stopped`; the feed is left untouched.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Superseded => Err(SessionError::Stale),
            SessionState::Stopped => {
                if self.prompt().map_or(true, |p| p.trim().is_empty()) {
                    return Err(SessionError::EmptyPrompt);
                }
                self.state = SessionState::Generating;
                Ok(())
            }
            _ => Err(SessionError::InvalidTransition(
                "resume requires a stopped session",
            )),
        }
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Superseded => Err(SessionError::Stale),
            SessionState::Generating => {
                self.state = SessionState::Stopped;
                Ok(())
            }
            _ => Err(SessionError::InvalidTransition(
                "stop requires a generating session",
            )),
        }
    }

    /// Force the terminal state. Used exclusively by the history switch
    /// coordinator; idempotent.
    pub fn supersede(&mut self) {
        self.state = SessionState::Superseded;
    }

    /// Fold a poll result into the machine. Counts are monotonic, and a late
    /// poll that still reports `running` must not revive a stopped session.
    pub fn apply_poll(&mut self, running: bool, generated_count: u64) {
        if self.state == SessionState::Superseded {
            return;
        }
        self.generated_count = self.generated_count.max(generated_count);
        if self.state == SessionState::Generating && !running {
            self.state = SessionState::Stopped;
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(prompt: &str) -> GenerationParams {
        GenerationParams::new(prompt).with_size(800, 1200)
    }

    #[test]
    fn start_rejects_empty_prompt_without_state_change() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.start(params("   ")), Err(SessionError::EmptyPrompt));
        assert_eq!(machine.state(), SessionState::Idle);
        assert!(machine.prompt().is_none());
    }

    #[test]
    fn start_trims_prompt_and_enters_generating() {
        let mut machine = SessionMachine::new();
        let outcome = machine.start(params("  a cat  ")).unwrap();
        assert!(outcome.prompt_changed);
        assert_eq!(machine.state(), SessionState::Generating);
        assert_eq!(machine.prompt(), Some("a cat"));
    }

    #[test]
    fn restart_with_same_prompt_keeps_count() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.apply_poll(true, 4);
        let outcome = machine.start(params("a cat")).unwrap();
        assert!(!outcome.prompt_changed);
        assert_eq!(machine.generated_count(), 4);
    }

    #[test]
    fn restart_with_new_prompt_resets_count() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.apply_poll(true, 4);
        let outcome = machine.start(params("a dog")).unwrap();
        assert!(outcome.prompt_changed);
        assert_eq!(machine.generated_count(), 0);
    }

    #[test]
    fn stop_then_resume_round_trip() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.stop().unwrap();
        assert_eq!(machine.state(), SessionState::Stopped);
        machine.resume().unwrap();
        assert_eq!(machine.state(), SessionState::Generating);
    }

    #[test]
    fn resume_requires_stopped() {
        let mut machine = SessionMachine::new();
        assert!(matches!(
            machine.resume(),
            Err(SessionError::InvalidTransition(_))
        ));
        machine.start(params("a cat")).unwrap();
        assert!(matches!(
            machine.resume(),
            Err(SessionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn late_running_poll_does_not_revive_stopped_session() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.stop().unwrap();
        machine.apply_poll(true, 7);
        assert_eq!(machine.state(), SessionState::Stopped);
        assert_eq!(machine.generated_count(), 7);
    }

    #[test]
    fn backend_finishing_moves_generating_to_stopped() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.apply_poll(false, 2);
        assert_eq!(machine.state(), SessionState::Stopped);
    }

    #[test]
    fn superseded_rejects_everything() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.supersede();
        assert_eq!(machine.start(params("a dog")), Err(SessionError::Stale));
        assert_eq!(machine.resume(), Err(SessionError::Stale));
        assert_eq!(machine.stop(), Err(SessionError::Stale));
        machine.apply_poll(true, 99);
        assert_eq!(machine.state(), SessionState::Superseded);
        assert_eq!(machine.generated_count(), 0);
    }

    #[test]
    fn counts_are_monotonic_across_out_of_order_polls() {
        let mut machine = SessionMachine::new();
        machine.start(params("a cat")).unwrap();
        machine.apply_poll(true, 5);
        machine.apply_poll(true, 3);
        assert_eq!(machine.generated_count(), 5);
    }

    #[test]
    fn from_record_lands_stopped() {
        let machine = SessionMachine::from_record("abc123", params("a cat"), 9);
        assert_eq!(machine.state(), SessionState::Stopped);
        assert_eq!(machine.record_id(), Some("abc123"));
        assert_eq!(machine.generated_count(), 9);
    }

    #[test]
    fn restore_maps_running_flag_to_state() {
        let running = SessionMachine::restore(params("a cat"), true, 2);
        assert_eq!(running.state(), SessionState::Generating);
        let stopped = SessionMachine::restore(params("a cat"), false, 2);
        assert_eq!(stopped.state(), SessionState::Stopped);
    }
}
