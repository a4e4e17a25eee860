//! Playback controller.
//!
//! Owns the single playback session and hides the one-shot nature of backend
//! sources: every pause, seek and resume tears the live source down and later
//! builds a new one, while the controller keeps the logical position.
//!
//! The controller is driven from one thread. Work that completes elsewhere
//! (fetch/decode on a worker thread, end-of-media from the output callback)
//! comes back as [`ControllerEvent`]s, and deferred seek resumes are run by
//! [`PlaybackController::tick`]. Both carry the session generation they were
//! created under and are dropped once a newer load or seek has happened.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clip_player_types::{PlaybackEndReason, PlayerStatus};
use crossbeam_channel::{Receiver, Sender};

use crate::backend::{AudioBackend, DecodedBuffer, OneShotSource, ResourceLoader};
use crate::callbacks::PlaybackCallbacks;
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};

/// Completion notifications delivered back to the controller's thread.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Fetch + decode finished for the load tagged `generation`.
    Loaded {
        generation: u64,
        resource: String,
        result: std::result::Result<DecodedBuffer, String>,
    },
    /// A started source ran out of audio.
    SourceEnded { source_id: u64 },
}

struct LiveSource<S> {
    id: u64,
    source: S,
}

#[derive(Clone, Copy, Debug)]
struct PendingResume {
    generation: u64,
    due: Duration,
}

struct PlaybackSession<S> {
    resource: Option<String>,
    buffer: Option<Arc<DecodedBuffer>>,
    live: Option<LiveSource<S>>,
    /// Position to resume from; authoritative only while `live` is `None`.
    logical_offset: f64,
    started_at: Duration,
    generation: u64,
    /// Scheduled seek resumes, oldest first. Superseded entries stay queued
    /// until due and are then dropped by generation.
    pending_resumes: Vec<PendingResume>,
    loading: bool,
}

impl<S> Default for PlaybackSession<S> {
    fn default() -> Self {
        Self {
            resource: None,
            buffer: None,
            live: None,
            logical_offset: 0.0,
            started_at: Duration::ZERO,
            generation: 0,
            pending_resumes: Vec::new(),
            loading: false,
        }
    }
}

/// Play/pause/seek/stop/volume controller over an [`AudioBackend`].
pub struct PlaybackController<B: AudioBackend> {
    backend: B,
    config: PlayerConfig,
    callbacks: PlaybackCallbacks,
    session: PlaybackSession<B::Source>,
    volume_fraction: f64,
    muted: bool,
    end_reason: Option<PlaybackEndReason>,
    next_source_id: u64,
    events_tx: Sender<ControllerEvent>,
    events_rx: Receiver<ControllerEvent>,
}

impl<B: AudioBackend> PlaybackController<B> {
    pub fn new(mut backend: B, config: PlayerConfig, callbacks: PlaybackCallbacks) -> Self {
        let volume_fraction = config.initial_fraction();
        backend.set_gain(volume_fraction as f32);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            backend,
            config,
            callbacks,
            session: PlaybackSession::default(),
            volume_fraction,
            muted: false,
            end_reason: None,
            next_source_id: 0,
            events_tx,
            events_rx,
        }
    }

    /// Tear down the current session and start fetching + decoding `resource`.
    ///
    /// Playback begins once the decode result is handled by [`Self::handle_event`].
    pub fn load_and_play(&mut self, resource: &str) -> Result<()> {
        let resource = resource.trim();
        if resource.is_empty() {
            return Err(reject(PlayerError::MissingResource));
        }

        self.stop();
        self.session.pending_resumes.clear();
        self.session.generation += 1;
        self.session.resource = Some(resource.to_string());
        self.session.buffer = None;
        self.session.logical_offset = 0.0;
        self.session.loading = true;

        let generation = self.session.generation;
        tracing::info!(resource, generation, "load requested");

        let loader = self.backend.loader();
        let tx = self.events_tx.clone();
        let resource = resource.to_string();
        thread::spawn(move || {
            let result = fetch_and_decode(loader.as_ref(), &resource);
            let _ = tx.send(ControllerEvent::Loaded {
                generation,
                resource,
                result,
            });
        });
        Ok(())
    }

    /// Start (or resume) playback of the loaded buffer from the logical offset.
    pub fn play(&mut self) -> Result<()> {
        if self.session.live.is_some() {
            return Ok(());
        }
        let Some(buffer) = self.session.buffer.clone() else {
            return Err(reject(PlayerError::NoBufferLoaded("play")));
        };
        self.session.pending_resumes.clear();
        self.apply_gain();

        let mut source = self.backend.create_source(buffer).map_err(backend_error)?;
        self.next_source_id += 1;
        let source_id = self.next_source_id;
        let tx = self.events_tx.clone();
        source.set_ended_hook(Some(Box::new(move || {
            let _ = tx.send(ControllerEvent::SourceEnded { source_id });
        })));

        let offset = self.session.logical_offset;
        if let Err(e) = source.start(offset) {
            source.set_ended_hook(None);
            source.stop();
            return Err(backend_error(e));
        }

        self.session.started_at = self.backend.now();
        self.session.live = Some(LiveSource {
            id: source_id,
            source,
        });
        self.end_reason = None;
        tracing::info!(offset_secs = offset, source_id, "playback started");
        self.callbacks.playback_start();
        Ok(())
    }

    /// Pause, keeping the current position. No-op when nothing is playing.
    pub fn pause(&mut self) {
        if let Some(live) = self.session.live.take() {
            let position = self.live_position();
            teardown(live);
            self.session.logical_offset = position;
            tracing::info!(offset_secs = position, "playback paused");
            self.callbacks.playback_pause();
        } else if !self.session.pending_resumes.is_empty() {
            self.session.pending_resumes.clear();
            tracing::info!(
                offset_secs = self.session.logical_offset,
                "playback paused before seek resume"
            );
            self.callbacks.playback_pause();
        }
    }

    /// Stop and rewind to the start. No-op when nothing is playing.
    pub fn stop(&mut self) {
        let was_active = match self.session.live.take() {
            Some(live) => {
                teardown(live);
                true
            }
            None => {
                let pending = !self.session.pending_resumes.is_empty();
                self.session.pending_resumes.clear();
                pending
            }
        };
        if !was_active {
            return;
        }
        self.session.logical_offset = 0.0;
        self.end_reason = Some(PlaybackEndReason::Stopped);
        tracing::info!("playback stopped");
        self.callbacks.playback_stopped();
    }

    /// Seek to `percent` (0..=100) of the loaded duration.
    pub fn seek_percentage(&mut self, percent: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(reject(PlayerError::PercentageOutOfRange(percent)));
        }
        let duration = self.loaded_duration("seek_percentage")?;
        self.seek(percent / 100.0 * duration)
    }

    /// Move the playback position to `time_secs`.
    ///
    /// While playing, the live source is torn down and a replacement starts after
    /// `seek_resume_delay` (see [`Self::tick`]).
    pub fn seek(&mut self, time_secs: f64) -> Result<()> {
        let duration = self.loaded_duration("seek")?;
        if !time_secs.is_finite() || time_secs < 0.0 {
            return Err(reject(PlayerError::InvalidSeekTime(time_secs)));
        }
        if time_secs > duration {
            return Err(reject(PlayerError::SeekBeyondDuration {
                time: time_secs,
                duration,
            }));
        }

        self.session.generation += 1;
        let generation = self.session.generation;
        self.session.logical_offset = time_secs;

        let due = self.backend.now() + self.config.seek_resume_delay;
        if let Some(live) = self.session.live.take() {
            teardown(live);
            self.session
                .pending_resumes
                .push(PendingResume { generation, due });
            tracing::info!(time_secs, generation, "seek while playing; resume scheduled");
        } else if !self.session.pending_resumes.is_empty() {
            // Earlier resumes are now stale and get dropped when they come due.
            self.session
                .pending_resumes
                .push(PendingResume { generation, due });
            tracing::info!(time_secs, generation, "seek rescheduled pending resume");
        } else {
            tracing::info!(time_secs, "seek");
        }

        self.callbacks.playback_seek(time_secs);
        Ok(())
    }

    /// Set the volume percent (0..=100) and apply it immediately.
    ///
    /// Applying a new level also lifts a mute.
    pub fn set_volume(&mut self, level: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&level) {
            return Err(reject(PlayerError::VolumeOutOfRange(level)));
        }
        self.volume_fraction = level / 100.0;
        self.muted = false;
        self.apply_gain();
        tracing::info!(volume = level, "volume changed");
        self.callbacks.volume_change(level);
        Ok(())
    }

    pub fn mute(&mut self) {
        self.muted = true;
        self.apply_gain();
    }

    pub fn unmute(&mut self) {
        self.muted = false;
        self.apply_gain();
    }

    /// Current position in seconds, or 0 (with a logged warning) when nothing is loaded.
    pub fn playback_time(&self) -> f64 {
        self.try_playback_time().unwrap_or(0.0)
    }

    pub fn try_playback_time(&self) -> Result<f64> {
        self.loaded_duration("playback_time")?;
        if self.session.live.is_some() {
            Ok(self.live_position())
        } else {
            Ok(self.session.logical_offset)
        }
    }

    /// Duration of the loaded buffer, or 0 (with a logged warning) when nothing is loaded.
    pub fn current_duration(&self) -> f64 {
        self.try_current_duration().unwrap_or(0.0)
    }

    pub fn try_current_duration(&self) -> Result<f64> {
        self.loaded_duration("current_duration")
    }

    pub fn is_playing(&self) -> bool {
        self.session.live.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    pub fn resource(&self) -> Option<&str> {
        self.session.resource.as_deref()
    }

    /// Volume percent (0..=100), independent of mute.
    pub fn volume(&self) -> f64 {
        self.volume_fraction * 100.0
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn status(&self) -> PlayerStatus {
        let loaded = self.session.buffer.is_some();
        PlayerStatus {
            resource: self.session.resource.clone(),
            playing: self.is_playing(),
            loading: self.session.loading,
            position_secs: loaded.then(|| self.playback_time()),
            duration_secs: self.session.buffer.as_ref().map(|b| b.duration_secs()),
            volume_percent: self.volume(),
            muted: self.muted,
            end_reason: self.end_reason,
        }
    }

    /// Receiver for controller events, for callers multiplexing their own loop.
    ///
    /// Events taken from it must be passed to [`Self::handle_event`].
    pub fn event_receiver(&self) -> Receiver<ControllerEvent> {
        self.events_rx.clone()
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Loaded {
                generation,
                resource,
                result,
            } => self.on_loaded(generation, resource, result),
            ControllerEvent::SourceEnded { source_id } => self.on_source_ended(source_id),
        }
    }

    /// Run deferred seek resumes that are due.
    ///
    /// Only a resume tagged with the current generation starts playback; ones
    /// superseded by a later seek are dropped.
    pub fn tick(&mut self) {
        let now = self.backend.now();
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .session
            .pending_resumes
            .drain(..)
            .partition(|p| p.due <= now);
        self.session.pending_resumes = waiting;

        for pending in due {
            if pending.generation != self.session.generation {
                tracing::debug!(
                    generation = pending.generation,
                    current = self.session.generation,
                    "discarding stale seek resume"
                );
                continue;
            }
            if let Err(e) = self.play() {
                tracing::warn!("seek resume failed: {e}");
            }
        }
    }

    /// Time until [`Self::tick`] has work to do, if anything is scheduled.
    pub fn next_wakeup(&self) -> Option<Duration> {
        let now = self.backend.now();
        self.session
            .pending_resumes
            .iter()
            .map(|p| p.due.saturating_sub(now))
            .min()
    }

    /// Handle every event already queued, then run due timers.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        self.tick();
    }

    /// Block up to `timeout` (or until the next timer) for one event, then [`Self::pump`].
    ///
    /// Returns `true` if an event arrived.
    pub fn wait_and_process(&mut self, timeout: Duration) -> bool {
        let wait = self.next_wakeup().map_or(timeout, |w| w.min(timeout));
        let got = match self.events_rx.recv_timeout(wait) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        };
        self.pump();
        got
    }

    fn on_loaded(
        &mut self,
        generation: u64,
        resource: String,
        result: std::result::Result<DecodedBuffer, String>,
    ) {
        if generation != self.session.generation
            || self.session.resource.as_deref() != Some(resource.as_str())
        {
            tracing::debug!(
                resource = %resource,
                generation,
                current = self.session.generation,
                "discarding stale decode"
            );
            return;
        }
        self.session.loading = false;

        match result {
            Ok(buffer) => {
                let duration = buffer.duration_secs();
                tracing::info!(
                    resource = %resource,
                    duration_secs = duration,
                    sample_rate = buffer.sample_rate(),
                    channels = buffer.channels(),
                    "buffer loaded"
                );
                self.session.buffer = Some(Arc::new(buffer));
                self.callbacks.buffer_loaded(&resource, duration);
                if let Err(e) = self.play() {
                    tracing::warn!("playback after load failed: {e}");
                }
            }
            Err(message) => {
                let err = PlayerError::Load { resource, message };
                tracing::error!("{err}");
                self.end_reason = Some(PlaybackEndReason::Error);
                self.callbacks.error(&err);
            }
        }
    }

    fn on_source_ended(&mut self, source_id: u64) {
        let current = self
            .session
            .live
            .as_ref()
            .is_some_and(|live| live.id == source_id);
        if !current {
            tracing::debug!(source_id, "ignoring end of a retired source");
            return;
        }
        if let Some(live) = self.session.live.take() {
            teardown(live);
        }
        self.session.logical_offset = 0.0;
        self.end_reason = Some(PlaybackEndReason::Eof);
        tracing::info!(source_id, "playback reached end of media");
        self.callbacks.playback_stopped();
        self.callbacks.playback_end();
    }

    fn loaded_duration(&self, op: &'static str) -> Result<f64> {
        self.session
            .buffer
            .as_ref()
            .map(|b| b.duration_secs())
            .ok_or_else(|| reject(PlayerError::NoBufferLoaded(op)))
    }

    /// Position of the live source, capped at the buffer end.
    fn live_position(&self) -> f64 {
        let elapsed = self
            .backend
            .now()
            .saturating_sub(self.session.started_at)
            .as_secs_f64();
        let position = self.session.logical_offset + elapsed;
        match self.session.buffer.as_ref() {
            Some(b) => position.min(b.duration_secs()),
            None => position,
        }
    }

    fn apply_gain(&mut self) {
        let gain = if self.muted {
            0.0
        } else {
            self.volume_fraction as f32
        };
        self.backend.set_gain(gain);
    }
}

impl<B: AudioBackend> Drop for PlaybackController<B> {
    fn drop(&mut self) {
        if let Some(live) = self.session.live.take() {
            teardown(live);
        }
    }
}

/// Detach the ended hook first so an explicit stop is never reported as end-of-media.
fn teardown<S: OneShotSource>(mut live: LiveSource<S>) {
    live.source.set_ended_hook(None);
    live.source.stop();
}

fn fetch_and_decode(
    loader: &dyn ResourceLoader,
    resource: &str,
) -> std::result::Result<DecodedBuffer, String> {
    let bytes = loader
        .fetch(resource)
        .map_err(|e| format!("fetch failed: {e:#}"))?;
    loader
        .decode(resource, bytes)
        .map_err(|e| format!("decode failed: {e:#}"))
}

fn reject(err: PlayerError) -> PlayerError {
    tracing::warn!("{err}");
    err
}

fn backend_error(err: anyhow::Error) -> PlayerError {
    tracing::error!("audio backend error: {err:#}");
    PlayerError::Backend(format!("{err:#}"))
}
