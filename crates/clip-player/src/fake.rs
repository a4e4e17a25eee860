//! In-memory backend for controller tests: manual clock, scripted loader,
//! and sources that record what the controller asked of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender};

use crate::backend::{AudioBackend, DecodedBuffer, EndedHook, OneShotSource, ResourceLoader};

const FAKE_RATE: u32 = 1_000;

enum Clip {
    Ready(f64),
    Gated(f64, Receiver<()>),
    Failing(String),
}

#[derive(Default)]
struct FakeLoader {
    clips: Mutex<HashMap<String, Clip>>,
    durations: Mutex<HashMap<String, f64>>,
}

impl ResourceLoader for FakeLoader {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        let clip = self
            .clips
            .lock()
            .unwrap()
            .remove(resource)
            .ok_or_else(|| anyhow!("no such clip: {resource}"))?;
        let duration = match clip {
            Clip::Ready(d) => d,
            Clip::Gated(d, gate) => {
                gate.recv()?;
                d
            }
            Clip::Failing(msg) => bail!(msg),
        };
        self.clips
            .lock()
            .unwrap()
            .insert(resource.to_string(), Clip::Ready(duration));
        self.durations
            .lock()
            .unwrap()
            .insert(resource.to_string(), duration);
        Ok(resource.as_bytes().to_vec())
    }

    fn decode(&self, resource: &str, _bytes: Vec<u8>) -> Result<DecodedBuffer> {
        let duration = self
            .durations
            .lock()
            .unwrap()
            .get(resource)
            .copied()
            .ok_or_else(|| anyhow!("nothing fetched for {resource}"))?;
        Ok(DecodedBuffer::silence(FAKE_RATE, 1, duration))
    }
}

#[derive(Default)]
struct FakeOutput {
    now: Duration,
    gain: f32,
    /// (offset, buffer duration) per `start` call.
    starts: Vec<(f64, f64)>,
    hooks: Vec<Option<EndedHook>>,
    live_index: Option<usize>,
    active: usize,
    max_active: usize,
}

pub(crate) struct FakeBackend {
    loader: Arc<FakeLoader>,
    output: Arc<Mutex<FakeOutput>>,
}

/// Test-side handles onto a [`FakeBackend`] owned by a controller.
#[derive(Clone)]
pub(crate) struct FakeHandles {
    loader: Arc<FakeLoader>,
    output: Arc<Mutex<FakeOutput>>,
}

impl FakeBackend {
    pub(crate) fn new() -> (Self, FakeHandles) {
        let loader = Arc::new(FakeLoader::default());
        let output = Arc::new(Mutex::new(FakeOutput::default()));
        let handles = FakeHandles {
            loader: loader.clone(),
            output: output.clone(),
        };
        (Self { loader, output }, handles)
    }
}

impl FakeHandles {
    pub(crate) fn add_clip(&self, resource: &str, duration_secs: f64) {
        self.loader
            .clips
            .lock()
            .unwrap()
            .insert(resource.to_string(), Clip::Ready(duration_secs));
    }

    /// Register a clip whose fetch blocks until the returned sender fires.
    pub(crate) fn add_gated_clip(&self, resource: &str, duration_secs: f64) -> Sender<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.loader
            .clips
            .lock()
            .unwrap()
            .insert(resource.to_string(), Clip::Gated(duration_secs, rx));
        tx
    }

    pub(crate) fn add_failing_clip(&self, resource: &str, message: &str) {
        self.loader
            .clips
            .lock()
            .unwrap()
            .insert(resource.to_string(), Clip::Failing(message.to_string()));
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.output.lock().unwrap().now += by;
    }

    pub(crate) fn gain(&self) -> f32 {
        self.output.lock().unwrap().gain
    }

    pub(crate) fn starts(&self) -> Vec<(f64, f64)> {
        self.output.lock().unwrap().starts.clone()
    }

    pub(crate) fn active_sources(&self) -> usize {
        self.output.lock().unwrap().active
    }

    pub(crate) fn max_active_sources(&self) -> usize {
        self.output.lock().unwrap().max_active
    }

    /// Simulate the live source draining its buffer. Returns `false` if no hook was attached.
    pub(crate) fn finish_live_source(&self) -> bool {
        let hook = {
            let mut out = self.output.lock().unwrap();
            match out.live_index {
                Some(i) => out.hooks[i].take(),
                None => None,
            }
        };
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }
}

pub(crate) struct FakeSource {
    index: usize,
    duration: f64,
    started: bool,
    output: Arc<Mutex<FakeOutput>>,
}

impl OneShotSource for FakeSource {
    fn start(&mut self, offset_secs: f64) -> Result<()> {
        if self.started {
            bail!("source already started");
        }
        self.started = true;
        let mut out = self.output.lock().unwrap();
        out.starts.push((offset_secs, self.duration));
        out.live_index = Some(self.index);
        out.active += 1;
        out.max_active = out.max_active.max(out.active);
        Ok(())
    }

    fn set_ended_hook(&mut self, hook: Option<EndedHook>) {
        self.output.lock().unwrap().hooks[self.index] = hook;
    }

    fn stop(self) {
        let hook = {
            let mut out = self.output.lock().unwrap();
            if self.started {
                out.active -= 1;
            }
            if out.live_index == Some(self.index) {
                out.live_index = None;
            }
            out.hooks[self.index].take()
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl AudioBackend for FakeBackend {
    type Source = FakeSource;

    fn loader(&self) -> Arc<dyn ResourceLoader> {
        self.loader.clone()
    }

    fn create_source(&mut self, buffer: Arc<DecodedBuffer>) -> Result<FakeSource> {
        let mut out = self.output.lock().unwrap();
        out.hooks.push(None);
        Ok(FakeSource {
            index: out.hooks.len() - 1,
            duration: buffer.duration_secs(),
            started: false,
            output: self.output.clone(),
        })
    }

    fn set_gain(&mut self, level: f32) {
        self.output.lock().unwrap().gain = level;
    }

    fn now(&self) -> Duration {
        self.output.lock().unwrap().now
    }
}
