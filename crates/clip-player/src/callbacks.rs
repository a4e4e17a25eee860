//! Lifecycle hooks supplied at construction.
//!
//! Every hook is optional; an absent hook is a no-op.

use crate::error::PlayerError;

type Hook = Box<dyn FnMut()>;

/// Named, optional lifecycle callbacks for a [`crate::controller::PlaybackController`].
#[derive(Default)]
pub struct PlaybackCallbacks {
    buffer_loaded: Option<Box<dyn FnMut(&str, f64)>>,
    playback_start: Option<Hook>,
    playback_pause: Option<Hook>,
    playback_stopped: Option<Hook>,
    playback_end: Option<Hook>,
    playback_seek: Option<Box<dyn FnMut(f64)>>,
    volume_change: Option<Box<dyn FnMut(f64)>>,
    error: Option<Box<dyn FnMut(&PlayerError)>>,
}

impl PlaybackCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the resource and its duration (seconds) once decode completes.
    pub fn on_buffer_loaded(mut self, f: impl FnMut(&str, f64) + 'static) -> Self {
        self.buffer_loaded = Some(Box::new(f));
        self
    }

    pub fn on_playback_start(mut self, f: impl FnMut() + 'static) -> Self {
        self.playback_start = Some(Box::new(f));
        self
    }

    pub fn on_playback_pause(mut self, f: impl FnMut() + 'static) -> Self {
        self.playback_pause = Some(Box::new(f));
        self
    }

    pub fn on_playback_stopped(mut self, f: impl FnMut() + 'static) -> Self {
        self.playback_stopped = Some(Box::new(f));
        self
    }

    /// Natural end of media. Fires after the stopped hook.
    pub fn on_playback_end(mut self, f: impl FnMut() + 'static) -> Self {
        self.playback_end = Some(Box::new(f));
        self
    }

    /// Called with the resolved seek target in seconds.
    pub fn on_playback_seek(mut self, f: impl FnMut(f64) + 'static) -> Self {
        self.playback_seek = Some(Box::new(f));
        self
    }

    /// Called with the new volume percent (0..100).
    pub fn on_volume_change(mut self, f: impl FnMut(f64) + 'static) -> Self {
        self.volume_change = Some(Box::new(f));
        self
    }

    /// Called for asynchronous load failures, which have no caller to return to.
    pub fn on_error(mut self, f: impl FnMut(&PlayerError) + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub(crate) fn buffer_loaded(&mut self, resource: &str, duration_secs: f64) {
        if let Some(f) = self.buffer_loaded.as_mut() {
            f(resource, duration_secs);
        }
    }

    pub(crate) fn playback_start(&mut self) {
        if let Some(f) = self.playback_start.as_mut() {
            f();
        }
    }

    pub(crate) fn playback_pause(&mut self) {
        if let Some(f) = self.playback_pause.as_mut() {
            f();
        }
    }

    pub(crate) fn playback_stopped(&mut self) {
        if let Some(f) = self.playback_stopped.as_mut() {
            f();
        }
    }

    pub(crate) fn playback_end(&mut self) {
        if let Some(f) = self.playback_end.as_mut() {
            f();
        }
    }

    pub(crate) fn playback_seek(&mut self, time_secs: f64) {
        if let Some(f) = self.playback_seek.as_mut() {
            f(time_secs);
        }
    }

    pub(crate) fn volume_change(&mut self, percent: f64) {
        if let Some(f) = self.volume_change.as_mut() {
            f(percent);
        }
    }

    pub(crate) fn error(&mut self, err: &PlayerError) {
        if let Some(f) = self.error.as_mut() {
            f(err);
        }
    }
}

impl std::fmt::Debug for PlaybackCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackCallbacks")
            .field("buffer_loaded", &self.buffer_loaded.is_some())
            .field("playback_start", &self.playback_start.is_some())
            .field("playback_pause", &self.playback_pause.is_some())
            .field("playback_stopped", &self.playback_stopped.is_some())
            .field("playback_end", &self.playback_end.is_some())
            .field("playback_seek", &self.playback_seek.is_some())
            .field("volume_change", &self.volume_change.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn absent_hooks_are_noops() {
        let mut cbs = PlaybackCallbacks::new();
        cbs.playback_start();
        cbs.playback_seek(1.0);
        cbs.error(&PlayerError::MissingResource);
    }

    #[test]
    fn registered_hooks_receive_arguments() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_seek = seen.clone();
        let seen_vol = seen.clone();
        let mut cbs = PlaybackCallbacks::new()
            .on_playback_seek(move |t| seen_seek.borrow_mut().push(("seek", t)))
            .on_volume_change(move |v| seen_vol.borrow_mut().push(("volume", v)));

        cbs.playback_seek(7.0);
        cbs.volume_change(40.0);

        assert_eq!(*seen.borrow(), vec![("seek", 7.0), ("volume", 40.0)]);
    }
}
