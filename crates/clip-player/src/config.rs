use std::time::Duration;

/// Controller tuning shared by every backend.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Starting volume percent (0..100). Out-of-range values fall back to 100.
    pub initial_volume: f64,
    /// Delay between tearing down a source on seek and starting its replacement.
    ///
    /// Stopping a source is not synchronous with the output releasing it, so the
    /// restart is deferred instead of immediate.
    pub seek_resume_delay: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_volume: 100.0,
            seek_resume_delay: Duration::from_millis(100),
        }
    }
}

impl PlayerConfig {
    /// Initial volume as a gain fraction in [0, 1].
    pub(crate) fn initial_fraction(&self) -> f64 {
        if (0.0..=100.0).contains(&self.initial_volume) {
            self.initial_volume / 100.0
        } else {
            1.0
        }
    }
}

/// Settings for the cpal-backed output and its resource loader.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Output device substring match; `None` selects the host default.
    pub device: Option<String>,
    /// Per-call timeout for HTTP fetches.
    pub http_timeout: Duration,
    /// Resampler input chunk size in frames.
    pub resample_chunk_frames: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            http_timeout: Duration::from_secs(10),
            resample_chunk_frames: 1024,
        }
    }
}
