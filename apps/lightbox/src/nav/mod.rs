use crate::feed::AppendOutcome;
use std::time::{Duration, Instant};

/// Normalized navigation intent, regardless of physical input origin
/// (swipe, pointer, or key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavIntent {
    Next,
    Previous,
    First,
    Last,
    Jump(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Forward,
    Backward,
}

/// Informational signal emitted when an intent runs past the end of the
/// feed. Never mutates state; presentation decides how to word it
/// ("generating more…" vs "no more").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSignal {
    pub direction: EdgeDirection,
    pub still_generating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Moved(usize),
    Edge(EdgeSignal),
    /// Empty feed: nothing to select.
    NoSelection,
    /// Intent was a no-op (already at the requested position).
    Unchanged,
}

#[derive(Debug, Default)]
struct HintState {
    fired: bool,
    dismissed: bool,
    shown_at: Option<Instant>,
}

/// Cursor over the feed plus the one-shot reveal and hint bookkeeping.
///
/// The cursor is `None` iff the feed is empty; every mutation keeps
/// `0 <= cursor < feed_len` otherwise.
#[derive(Debug, Default)]
pub struct Navigator {
    cursor: Option<usize>,
    hint: HintState,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh navigator over a feed seeded by a history switch: cursor at 0
    /// when anything exists, hint not yet armed.
    pub fn seeded(feed_len: usize) -> Self {
        Self {
            cursor: if feed_len > 0 { Some(0) } else { None },
            hint: HintState::default(),
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn apply(
        &mut self,
        intent: NavIntent,
        feed_len: usize,
        still_generating: bool,
    ) -> NavOutcome {
        if feed_len == 0 {
            return NavOutcome::NoSelection;
        }
        let cursor = self.cursor.unwrap_or(0);
        let edge = |direction| {
            NavOutcome::Edge(EdgeSignal {
                direction,
                still_generating,
            })
        };
        match intent {
            NavIntent::Next => {
                if cursor + 1 < feed_len {
                    self.move_to(cursor + 1)
                } else {
                    edge(EdgeDirection::Forward)
                }
            }
            NavIntent::Previous => {
                if cursor > 0 {
                    self.move_to(cursor - 1)
                } else {
                    edge(EdgeDirection::Backward)
                }
            }
            NavIntent::First => {
                if cursor != 0 {
                    self.move_to(0)
                } else {
                    NavOutcome::Unchanged
                }
            }
            NavIntent::Last => {
                if cursor != feed_len - 1 {
                    self.move_to(feed_len - 1)
                } else {
                    NavOutcome::Unchanged
                }
            }
            NavIntent::Jump(index) => {
                if index >= feed_len {
                    edge(EdgeDirection::Forward)
                } else if index != cursor {
                    self.move_to(index)
                } else {
                    NavOutcome::Unchanged
                }
            }
        }
    }

    fn move_to(&mut self, index: usize) -> NavOutcome {
        self.cursor = Some(index);
        NavOutcome::Moved(index)
    }

    /// Feed-append hook. Snaps the cursor to 0 the first time the feed
    /// becomes non-empty (first-artifact auto-reveal); later appends never
    /// move it. Arms the multi-item hint the first time the feed holds two
    /// or more artifacts while the cursor is still on the first one.
    pub fn on_append(&mut self, outcome: AppendOutcome, feed_len: usize, now: Instant) {
        if outcome.appended == 0 {
            return;
        }
        if outcome.was_empty && feed_len > 0 {
            self.cursor = Some(0);
        }
        if !self.hint.fired && !self.hint.dismissed && feed_len >= 2 && self.cursor == Some(0) {
            self.hint.fired = true;
            self.hint.shown_at = Some(now);
        }
    }

    /// Delete-adjustment: earlier removals shift the cursor down; removing
    /// the selected artifact clamps to the new tail; an emptied feed clears
    /// the selection.
    pub fn on_remove(&mut self, removed: usize, feed_len: usize) {
        let Some(cursor) = self.cursor else {
            return;
        };
        if feed_len == 0 {
            self.cursor = None;
            return;
        }
        let next = if removed < cursor {
            cursor - 1
        } else {
            cursor.min(feed_len - 1)
        };
        self.cursor = Some(next);
    }

    pub fn dismiss_hint(&mut self) {
        self.hint.dismissed = true;
    }

    pub fn hint_visible(&self, now: Instant, expiry: Duration) -> bool {
        if self.hint.dismissed {
            return false;
        }
        matches!(self.hint.shown_at, Some(t) if now.duration_since(t) < expiry)
    }
}
