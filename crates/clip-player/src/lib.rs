//! One-shot audio clip playback with pause, seek and volume control.
//!
//! [`controller::PlaybackController`] drives a single session over an
//! [`backend::AudioBackend`]; [`output::CpalBackend`] is the CPAL implementation.

pub mod backend;
pub mod callbacks;
pub mod config;
pub mod controller;
pub mod decode;
pub mod device;
pub mod error;
pub mod fetch;
pub mod output;
pub mod resample;

#[cfg(test)]
mod fake;

pub use callbacks::PlaybackCallbacks;
pub use config::{OutputConfig, PlayerConfig};
pub use controller::{ControllerEvent, PlaybackController};
pub use error::PlayerError;
pub use output::CpalBackend;
