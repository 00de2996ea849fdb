//! Wire payloads exchanged with the generation service. The REST surface is
//! the single source of truth for feed content; the push channel carries
//! phase and log signaling only.

use crate::model::{ArtifactId, GenerationParams, HistoryRecord, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use serde::{Deserialize, Serialize};

/// The backend treats generation as unbounded; the request still carries a
/// count field, pinned high.
pub const UNBOUNDED_COUNT: u32 = 999_999;

/// Snapshot returned by the status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(rename = "is_running")]
    pub running: bool,
    #[serde(default)]
    pub generated_count: u64,
    #[serde(default, rename = "images")]
    pub artifacts: Vec<ArtifactId>,
    #[serde(default)]
    pub current_prompt: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            running: false,
            generated_count: 0,
            artifacts: Vec::new(),
            current_prompt: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub prompt: String,
    pub count: u32,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl StartRequest {
    pub fn unbounded(params: &GenerationParams) -> Self {
        Self {
            prompt: params.prompt.clone(),
            count: UNBOUNDED_COUNT,
            width: params.width,
            height: params.height,
            image_path: params.source_image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMoreRequest {
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArtifactRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRecordRequest {
    pub prompt_id: String,
}

/// Generic `{success, message?}` acknowledgment used by several endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    #[serde(default)]
    pub current_prompt: Option<String>,
    #[serde(default)]
    pub total_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArtifactResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "images")]
    pub remaining: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryListResponse {
    pub success: bool,
    #[serde(default)]
    pub records: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecordResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub record: Option<HistoryRecord>,
    #[serde(default, rename = "images")]
    pub artifacts: Vec<ArtifactId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetPromptResponse {
    pub success: bool,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Generation phase reported over the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushPhase {
    Queued,
    Rendering,
    Error,
}

/// Push-channel event. Carries no artifact payload: the poll channel is the
/// single writer of feed content, push only signals phase and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    Status {
        status: PushPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Log {
        line: String,
    },
}
