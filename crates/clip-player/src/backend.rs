//! Audio backend contract.
//!
//! The controller only talks to audio through these traits:
//! - [`ResourceLoader`] fetches and decodes on a worker thread
//! - [`AudioBackend`] owns the output sink, the gain path and the clock
//! - [`OneShotSource`] plays a decoded buffer once from an offset

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

/// Fully decoded audio held in memory as interleaved `f32` samples.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBuffer {
    sample_rate: u32,
    channels: usize,
    samples: Vec<f32>,
}

impl DecodedBuffer {
    /// Wrap interleaved samples. Trailing samples that do not form a full frame are dropped.
    pub fn new(sample_rate: u32, channels: usize, mut samples: Vec<f32>) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    /// Silent buffer of the given length.
    #[cfg(test)]
    pub(crate) fn silence(sample_rate: u32, channels: usize, duration_secs: f64) -> Self {
        let frames = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(sample_rate, channels, vec![0.0; frames * channels.max(1)])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Length in seconds (0 when the sample rate is unknown).
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame index for an offset in seconds, clamped to the buffer length.
    pub fn frame_at(&self, offset_secs: f64) -> usize {
        if !offset_secs.is_finite() || offset_secs <= 0.0 {
            return 0;
        }
        let frame = (offset_secs * self.sample_rate as f64).floor() as usize;
        frame.min(self.frames())
    }
}

/// Callback fired at most once when a started source runs out of audio.
pub type EndedHook = Box<dyn FnOnce() + Send + 'static>;

/// Fetch + decode half of the backend. Runs off the controller's thread.
pub trait ResourceLoader: Send + Sync + 'static {
    /// Read the raw bytes behind `resource`.
    fn fetch(&self, resource: &str) -> Result<Vec<u8>>;

    /// Decode fetched bytes. `resource` is passed along for format hints.
    fn decode(&self, resource: &str, bytes: Vec<u8>) -> Result<DecodedBuffer>;
}

/// A playback primitive that starts once and cannot be restarted or repositioned.
pub trait OneShotSource {
    /// Begin output at `offset_secs` into the buffer. Fails if already started.
    fn start(&mut self, offset_secs: f64) -> Result<()>;

    /// Attach or detach the end-of-media hook.
    ///
    /// A hook still attached when [`OneShotSource::stop`] runs fires, matching
    /// platform sources that report `ended` on explicit stop.
    fn set_ended_hook(&mut self, hook: Option<EndedHook>);

    /// Stop output permanently and release the sink.
    fn stop(self);
}

/// Output side of the backend: source factory, gain and clock.
pub trait AudioBackend {
    type Source: OneShotSource;

    /// Loader used for `load_and_play`; shared with worker threads.
    fn loader(&self) -> Arc<dyn ResourceLoader>;

    /// Build a source for `buffer` routed through the gain path.
    fn create_source(&mut self, buffer: Arc<DecodedBuffer>) -> Result<Self::Source>;

    /// Set the gain applied to every source, in [0, 1].
    fn set_gain(&mut self, level: f32);

    /// Monotonic clock reading.
    fn now(&self) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_frames_and_rate() {
        let buf = DecodedBuffer::new(48_000, 2, vec![0.0; 96_000 * 2]);
        assert_eq!(buf.frames(), 96_000);
        assert!((buf.duration_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn partial_frame_is_dropped() {
        let buf = DecodedBuffer::new(10, 2, vec![0.0; 5]);
        assert_eq!(buf.samples().len(), 4);
        assert_eq!(buf.frames(), 2);
    }

    #[test]
    fn zero_rate_has_zero_duration() {
        let buf = DecodedBuffer::new(0, 1, vec![0.0; 10]);
        assert_eq!(buf.duration_secs(), 0.0);
    }

    #[test]
    fn frame_at_clamps() {
        let buf = DecodedBuffer::silence(100, 1, 2.0);
        assert_eq!(buf.frame_at(-1.0), 0);
        assert_eq!(buf.frame_at(0.5), 50);
        assert_eq!(buf.frame_at(5.0), 200);
        assert_eq!(buf.frame_at(f64::NAN), 0);
    }
}
