//! CPAL-backed [`AudioBackend`].
//!
//! One output stream is opened for the lifetime of the backend. The stream
//! callback reads from a single voice slot; a [`CpalSource`] occupies the slot
//! from `start` until `stop` or until its buffer runs out, so at most one
//! source is ever audible. Gain is applied in the callback from an atomic.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::backend::{AudioBackend, DecodedBuffer, EndedHook, OneShotSource, ResourceLoader};
use crate::config::OutputConfig;
use crate::device;
use crate::error::PlayerError;
use crate::fetch::DefaultLoader;

struct Voice {
    id: u64,
    buffer: Arc<DecodedBuffer>,
    /// Next frame to play.
    pos: usize,
    ended: Option<EndedHook>,
}

/// The single playback slot shared between sources and the stream callback.
pub(crate) struct VoiceSlot {
    active: Mutex<Option<Voice>>,
    gain_bits: AtomicU32,
}

impl VoiceSlot {
    pub(crate) fn new(gain: f32) -> Self {
        Self {
            active: Mutex::new(None),
            gain_bits: AtomicU32::new(gain.to_bits()),
        }
    }

    pub(crate) fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_gain(&self, gain: f32) {
        self.gain_bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Occupy the slot, returning any voice that was still in it.
    fn install(&self, voice: Voice) -> Option<Voice> {
        match self.active.lock() {
            Ok(mut g) => g.replace(voice),
            Err(poisoned) => poisoned.into_inner().replace(voice),
        }
    }

    /// Take the voice out of the slot if it still belongs to `id`.
    fn remove(&self, id: u64) -> Option<Voice> {
        let mut g = match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if g.as_ref().is_some_and(|v| v.id == id) {
            g.take()
        } else {
            None
        }
    }

    /// Swap the ended hook of voice `id`. Returns `false` if that voice is gone.
    fn set_hook(&self, id: u64, hook: Option<EndedHook>) -> bool {
        let mut g = match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match g.as_mut() {
            Some(v) if v.id == id => {
                v.ended = hook;
                true
            }
            _ => false,
        }
    }

    /// Fill `out` (interleaved, `channels_out` wide) from the active voice.
    ///
    /// When the voice runs out it is removed and its ended hook is returned for
    /// the caller to fire outside the lock.
    pub(crate) fn render(&self, out: &mut [f32], channels_out: usize) -> Option<EndedHook> {
        let channels_out = channels_out.max(1);
        let gain = self.gain();
        let mut guard = match self.active.lock() {
            Ok(g) => g,
            Err(_) => {
                out.fill(0.0);
                return None;
            }
        };
        let Some(voice) = guard.as_mut() else {
            out.fill(0.0);
            return None;
        };

        let src_channels = voice.buffer.channels();
        let total_frames = voice.buffer.frames();
        let frames_out = out.len() / channels_out;
        let mut written = 0usize;
        while written < frames_out && voice.pos < total_frames {
            let start = voice.pos * src_channels;
            let frame = &voice.buffer.samples()[start..start + src_channels];
            for ch in 0..channels_out {
                out[written * channels_out + ch] = map_channel(frame, channels_out, ch) * gain;
            }
            voice.pos += 1;
            written += 1;
        }
        out[written * channels_out..].fill(0.0);

        if voice.pos >= total_frames {
            return guard.take().and_then(|v| v.ended);
        }
        None
    }
}

/// Output sample for `dst_ch` from one source frame.
///
/// - mono → any: duplicate
/// - stereo → mono: average L/R
/// - otherwise: clamp to the available source channels
fn map_channel(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (frame.len(), dst_channels) {
        (1, _) => frame[0],
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (n, _) => frame[dst_ch.min(n - 1)],
    }
}

/// A one-shot source playing through the backend's voice slot.
pub struct CpalSource {
    id: u64,
    buffer: Arc<DecodedBuffer>,
    slot: Arc<VoiceSlot>,
    pending_hook: Option<EndedHook>,
    started: bool,
}

impl OneShotSource for CpalSource {
    fn start(&mut self, offset_secs: f64) -> Result<()> {
        if self.started {
            bail!("source {} already started", self.id);
        }
        self.started = true;
        let voice = Voice {
            id: self.id,
            buffer: self.buffer.clone(),
            pos: self.buffer.frame_at(offset_secs),
            ended: self.pending_hook.take(),
        };
        if let Some(previous) = self.slot.install(voice) {
            tracing::warn!(
                source_id = self.id,
                replaced = previous.id,
                "voice slot was still occupied"
            );
        }
        Ok(())
    }

    fn set_ended_hook(&mut self, hook: Option<EndedHook>) {
        if self.started {
            self.slot.set_hook(self.id, hook);
        } else {
            self.pending_hook = hook;
        }
    }

    fn stop(self) {
        if let Some(voice) = self.slot.remove(self.id) {
            if let Some(hook) = voice.ended {
                hook();
            }
        }
    }
}

/// Audio backend over the default CPAL host.
pub struct CpalBackend {
    _stream: cpal::Stream,
    slot: Arc<VoiceSlot>,
    loader: Arc<DefaultLoader>,
    epoch: Instant,
    next_source_id: u64,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalBackend {
    /// Open the configured output device and start its stream.
    ///
    /// Fails with [`PlayerError::UnsupportedEnvironment`] when the host has no
    /// usable output.
    pub fn open(cfg: &OutputConfig) -> std::result::Result<Self, PlayerError> {
        Self::open_inner(cfg).map_err(|e| {
            tracing::error!("audio output unavailable: {e:#}");
            PlayerError::UnsupportedEnvironment(format!("{e:#}"))
        })
    }

    fn open_inner(cfg: &OutputConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, cfg.device.as_deref())?;
        let device_name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let config = device::pick_output_config(&device)?;
        let stream_config: cpal::StreamConfig = config.clone().into();

        let slot = Arc::new(VoiceSlot::new(1.0));
        let stream = build_output_stream(&device, &stream_config, config.sample_format(), &slot)?;
        stream.play()?;

        tracing::info!(
            device = %device_name,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            "output stream started"
        );

        let loader = Arc::new(DefaultLoader::new(
            cfg.http_timeout,
            Some(stream_config.sample_rate),
            cfg.resample_chunk_frames,
        ));
        Ok(Self {
            _stream: stream,
            slot,
            loader,
            epoch: Instant::now(),
            next_source_id: 0,
            device_name,
            sample_rate: stream_config.sample_rate,
            channels: stream_config.channels,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioBackend for CpalBackend {
    type Source = CpalSource;

    fn loader(&self) -> Arc<dyn ResourceLoader> {
        self.loader.clone()
    }

    fn create_source(&mut self, buffer: Arc<DecodedBuffer>) -> Result<CpalSource> {
        if buffer.sample_rate() != self.sample_rate {
            return Err(anyhow!(
                "buffer rate {} Hz does not match output rate {} Hz",
                buffer.sample_rate(),
                self.sample_rate
            ));
        }
        self.next_source_id += 1;
        Ok(CpalSource {
            id: self.next_source_id,
            buffer,
            slot: self.slot.clone(),
            pending_hook: None,
            started: false,
        })
    }

    fn set_gain(&mut self, level: f32) {
        self.slot.set_gain(level);
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Build the CPAL output stream for the device's sample format.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    slot: &Arc<VoiceSlot>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, slot),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, slot),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, slot),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, slot),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder: render into an `f32` scratch buffer, then convert.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    slot: &Arc<VoiceSlot>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let slot_cb = slot.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let buf = &mut scratch[..data.len()];
            let ended = slot_cb.render(buf, channels_out);
            for (dst, src) in data.iter_mut().zip(buf.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
            if let Some(hook) = ended {
                hook();
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook(counter: &Arc<AtomicUsize>) -> EndedHook {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn source(slot: &Arc<VoiceSlot>, id: u64, samples: Vec<f32>, channels: usize) -> CpalSource {
        CpalSource {
            id,
            buffer: Arc::new(DecodedBuffer::new(10, channels, samples)),
            slot: slot.clone(),
            pending_hook: None,
            started: false,
        }
    }

    #[test]
    fn map_channel_rules() {
        assert_eq!(map_channel(&[0.5], 2, 1), 0.5);
        assert_eq!(map_channel(&[0.2, 0.4], 1, 0), 0.5 * (0.2 + 0.4));
        assert_eq!(map_channel(&[0.2, 0.4], 2, 1), 0.4);
        assert_eq!(map_channel(&[0.1, 0.2, 0.3], 6, 5), 0.3);
    }

    #[test]
    fn render_without_voice_is_silence() {
        let slot = VoiceSlot::new(1.0);
        let mut out = vec![1.0f32; 8];
        assert!(slot.render(&mut out, 2).is_none());
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn render_applies_gain_and_offset() {
        let slot = Arc::new(VoiceSlot::new(0.5));
        let mut src = source(&slot, 1, vec![0.1, 0.2, 0.4, 0.8], 1);
        src.start(0.2).unwrap();

        let mut out = vec![0.0f32; 4];
        assert!(slot.render(&mut out, 2).is_none());
        assert_eq!(out, vec![0.2, 0.2, 0.4, 0.4]);
    }

    #[test]
    fn end_of_buffer_fires_hook_once() {
        let slot = Arc::new(VoiceSlot::new(1.0));
        let fired = Arc::new(AtomicUsize::new(0));
        let mut src = source(&slot, 1, vec![0.1, 0.2, 0.3], 1);
        src.set_ended_hook(Some(counting_hook(&fired)));
        src.start(0.0).unwrap();

        let mut out = vec![0.0f32; 4];
        let hook = slot.render(&mut out, 1).expect("voice should end");
        hook();
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.0]);
        assert!(slot.render(&mut out, 1).is_none());

        src.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_after_detach_is_silent() {
        let slot = Arc::new(VoiceSlot::new(1.0));
        let fired = Arc::new(AtomicUsize::new(0));
        let mut src = source(&slot, 1, vec![0.1; 100], 1);
        src.set_ended_hook(Some(counting_hook(&fired)));
        src.start(0.0).unwrap();
        src.set_ended_hook(None);
        src.stop();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        let mut out = vec![1.0f32; 2];
        assert!(slot.render(&mut out, 1).is_none());
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn stop_with_hook_attached_reports_ended() {
        let slot = Arc::new(VoiceSlot::new(1.0));
        let fired = Arc::new(AtomicUsize::new(0));
        let mut src = source(&slot, 1, vec![0.1; 100], 1);
        src.set_ended_hook(Some(counting_hook(&fired)));
        src.start(0.0).unwrap();
        src.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_cannot_start_twice() {
        let slot = Arc::new(VoiceSlot::new(1.0));
        let mut src = source(&slot, 1, vec![0.1; 10], 1);
        src.start(0.0).unwrap();
        assert!(src.start(0.0).is_err());
    }

    #[test]
    fn stale_source_stop_leaves_newer_voice() {
        let slot = Arc::new(VoiceSlot::new(1.0));
        let mut old = source(&slot, 1, vec![0.1; 10], 1);
        old.start(0.0).unwrap();
        let mut new = source(&slot, 2, vec![0.7; 10], 1);
        new.start(0.0).unwrap();
        old.stop();

        let mut out = vec![0.0f32; 1];
        slot.render(&mut out, 1);
        assert_eq!(out, vec![0.7]);
    }

    #[test]
    fn gain_is_clamped() {
        let slot = VoiceSlot::new(1.0);
        slot.set_gain(2.0);
        assert_eq!(slot.gain(), 1.0);
        slot.set_gain(-1.0);
        assert_eq!(slot.gain(), 0.0);
    }
}
