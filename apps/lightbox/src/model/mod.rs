use serde::{Deserialize, Serialize};
use std::fmt;

/// Arrival counter for artifacts within one feed. Strictly increasing by
/// arrival order, never reused after a deletion.
pub type Seq = u64;

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 1200;

/// Opaque handle issued by the generation backend (a file name in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One generated unit of content. `seq` records arrival position; display
/// order is the feed's vector order, compacted on delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub seq: Seq,
}

/// Parameters defining one generation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub source_image: Option<String>,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            source_image: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_source_image(mut self, path: impl Into<String>) -> Self {
        self.source_image = Some(path.into());
        self
    }
}

/// Record describing a past (or current) generation session. Owned by the
/// external history store; the engine never assumes it holds the only copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub prompt: String,
    #[serde(default = "default_record_width")]
    pub width: u32,
    #[serde(default = "default_record_height")]
    pub height: u32,
    #[serde(default, rename = "image_count")]
    pub artifact_count: usize,
}

fn default_record_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_record_height() -> u32 {
    DEFAULT_HEIGHT
}

/// Monotonically increasing tag distinguishing a session instance from any
/// superseded predecessor. Async completions carry the epoch they were
/// issued under and are dropped when it no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    pub const ZERO: Self = Self(0);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}
