use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StopFailure;

/// Observable phase of the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BroadcastState {
    Idle,
    Live,
    Stopping,
    Uploading { progress: f32 },
    Finalizing,
    /// Transient, always followed by `Idle`.
    Error { reason: StopFailure },
}

/// One live broadcast attempt, created once the remote start call succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSession {
    pub session_id: String,
    pub post_id: String,
    pub title: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartBroadcast {
    pub title: String,
    pub description: String,
    /// Post body, falls back to the description when empty
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    /// Release the capture device as well; otherwise it stays open for preview.
    pub close_view: bool,
}

/// Outcome of a stop choreography.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopReport {
    pub session_id: String,
    pub chunks: usize,
    pub bytes: usize,
    /// The server persisted the recording (a media id was assigned).
    pub video_saved: bool,
    pub media_id: Option<String>,
    pub file_url: Option<String>,
    /// Locator of the preserved local copy, if storage is enabled.
    pub local_copy: Option<String>,
    /// Best playable locator: the server copy, else the local one.
    pub recorded_video: Option<String>,
    pub ended_remotely: bool,
    pub failure: Option<StopFailure>,
}
