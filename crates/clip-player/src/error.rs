//! Errors reported by the playback controller.
//!
//! Everything except [`PlayerError::UnsupportedEnvironment`] is non-fatal: the
//! failing call leaves the session untouched and the controller stays usable.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// No usable audio output on this host.
    #[error("audio output not supported: {0}")]
    UnsupportedEnvironment(String),

    /// `load_and_play` was called without a resource.
    #[error("a resource must be specified when loading audio")]
    MissingResource,

    /// An operation needs a decoded buffer but none is loaded yet.
    #[error("no audio loaded; load a resource before calling {0}")]
    NoBufferLoaded(&'static str),

    #[error("invalid seek percentage {0}; expected 0..=100")]
    PercentageOutOfRange(f64),

    #[error("invalid seek time {0}s")]
    InvalidSeekTime(f64),

    #[error("cannot seek to {time}s beyond the current duration {duration}s")]
    SeekBeyondDuration { time: f64, duration: f64 },

    #[error("invalid volume {0}; expected 0..=100")]
    VolumeOutOfRange(f64),

    /// Fetch or decode of `resource` failed.
    #[error("failed to load {resource}: {message}")]
    Load { resource: String, message: String },

    /// The backend refused to create or start a source.
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl PlayerError {
    /// `true` for misuse errors (bad arguments, wrong state).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PlayerError::MissingResource
                | PlayerError::NoBufferLoaded(_)
                | PlayerError::PercentageOutOfRange(_)
                | PlayerError::InvalidSeekTime(_)
                | PlayerError::SeekBeyondDuration { .. }
                | PlayerError::VolumeOutOfRange(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
