use serde::{Deserialize, Serialize};

/// Reason why the last playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of the decoded buffer.
    Eof,
    /// Fetch or decode failed before playback could start.
    Error,
    /// Playback was explicitly stopped (or superseded by a new load).
    Stopped,
}

/// Point-in-time view of the playback controller.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    /// Resource (URL or path) requested by the last load, if any.
    pub resource: Option<String>,
    /// `true` while a one-shot source is live.
    pub playing: bool,
    /// `true` between a load request and its decode completing.
    pub loading: bool,
    /// Current playback position in seconds, when a buffer is loaded.
    pub position_secs: Option<f64>,
    /// Duration of the loaded buffer in seconds.
    pub duration_secs: Option<f64>,
    /// User-facing volume percent (0..100).
    pub volume_percent: f64,
    /// `true` while output gain is forced to zero.
    pub muted: bool,
    /// End reason of the previous session, cleared when playback starts.
    pub end_reason: Option<PlaybackEndReason>,
}
