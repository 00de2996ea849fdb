use crate::model::{Artifact, ArtifactId, Seq};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("unknown artifact: {0}")]
    UnknownArtifact(ArtifactId),
}

/// Outcome of one poll-snapshot ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendOutcome {
    /// Artifacts appended by this ingest.
    pub appended: usize,
    /// Whether the feed was empty before this ingest.
    pub was_empty: bool,
}

/// Ordered, deduplicated artifact list for the active session.
///
/// The poll channel is the single writer of feed content: snapshots are
/// treated as prefix-stable supersets and only the suffix beyond the locally
/// known length is appended. Removals the engine performed locally always
/// win over a shorter (or stale) snapshot; deleted ids are tombstoned so a
/// lagging backend cannot resurrect them.
#[derive(Debug, Default)]
pub struct Feed {
    entries: Vec<Artifact>,
    tombstones: HashSet<ArtifactId>,
    next_seq: Seq,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a feed pre-populated from a history fetch.
    pub fn seeded(ids: impl IntoIterator<Item = ArtifactId>) -> Self {
        let mut feed = Self::new();
        let ids: Vec<ArtifactId> = ids.into_iter().collect();
        feed.ingest_snapshot(&ids);
        feed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Artifact> {
        self.entries.get(index)
    }

    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.entries.iter().any(|a| &a.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ArtifactId> {
        self.entries.iter().map(|a| &a.id)
    }

    /// Reconcile one poll snapshot into the feed.
    ///
    /// Tombstoned ids are filtered out first, which restores the prefix
    /// stability the suffix rule relies on after a local delete. A snapshot
    /// no longer than the local feed is a no-op: local state wins for
    /// removals it performed itself, and re-ingesting the same snapshot
    /// yields an empty suffix.
    pub fn ingest_snapshot(&mut self, snapshot: &[ArtifactId]) -> AppendOutcome {
        let was_empty = self.entries.is_empty();
        let visible: Vec<&ArtifactId> = snapshot
            .iter()
            .filter(|id| !self.tombstones.contains(id))
            .collect();
        if visible.len() <= self.entries.len() {
            return AppendOutcome {
                appended: 0,
                was_empty,
            };
        }
        let mut appended = 0;
        for &id in &visible[self.entries.len()..] {
            if self.contains(id) {
                continue;
            }
            self.entries.push(Artifact {
                id: id.clone(),
                seq: self.next_seq,
            });
            self.next_seq += 1;
            appended += 1;
        }
        AppendOutcome {
            appended,
            was_empty,
        }
    }

    /// Remove one artifact and compact the display order. The id is
    /// tombstoned so later snapshots cannot bring it back.
    pub fn remove(&mut self, id: &ArtifactId) -> Result<usize, FeedError> {
        let index = self
            .entries
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| FeedError::UnknownArtifact(id.clone()))?;
        self.entries.remove(index);
        self.tombstones.insert(id.clone());
        Ok(index)
    }
}
