//! Audio context: the engine's handle to the host audio system
//!
//! A context owns the shared clock and the output stream, and sums every
//! connected render source into the device buffer. It is created explicitly,
//! handed to the transport and metronome, and torn down with `close()`.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::audio::device::{default_output_device, output_device_by_name};
use crate::audio::output::{OutputStream, RenderFn};
use crate::clock::{MonotonicClock, SharedClock};
use crate::config::AudioConfig;
use crate::error::EngineError;

/// Timing of one render block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderBlock {
    /// Clock time of the first frame in the block
    pub start: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RenderBlock {
    /// Clock time of frame `index` within the block
    pub fn frame_time(&self, index: usize) -> f64 {
        self.start + index as f64 / self.sample_rate as f64
    }
}

/// Anything that adds audio into the context output
pub trait RenderSource: Send + Sync {
    /// Add this source's signal into the interleaved `out` block
    fn render(&self, block: &RenderBlock, out: &mut [f32]);
}

/// Lifecycle of the host audio connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    Closed,
}

type Sources = Arc<RwLock<Vec<Arc<dyn RenderSource>>>>;

/// Explicitly owned host audio resource
pub struct AudioContext {
    clock: SharedClock,
    sample_rate: u32,
    channels: u16,
    sources: Sources,
    state: Mutex<ContextState>,
    /// Device output; `None` for offline contexts
    output: Mutex<Option<OutputStream>>,
    device_name: Option<String>,
}

impl AudioContext {
    /// Open the configured output device and start rendering
    pub fn open(config: &AudioConfig) -> Result<Arc<Self>, EngineError> {
        let clock = MonotonicClock::shared();
        let sources: Sources = Arc::new(RwLock::new(Vec::new()));

        let device = match &config.output_device {
            Some(name) => output_device_by_name(name)?,
            None => default_output_device()?,
        };
        let device_name = device.name.clone();
        let render = render_fn(clock.clone(), sources.clone(), config.sample_rate);
        let output = OutputStream::start(device, config.sample_rate, config.channels, render)?;

        Ok(Arc::new(Self {
            clock,
            sample_rate: config.sample_rate,
            channels: config.channels,
            sources,
            state: Mutex::new(ContextState::Running),
            output: Mutex::new(Some(output)),
            device_name: Some(device_name),
        }))
    }

    /// Context without a device; audio is pulled with `render()`
    pub fn offline(sample_rate: u32, channels: u16) -> Arc<Self> {
        Self::offline_with_clock(MonotonicClock::shared(), sample_rate, channels)
    }

    pub fn offline_with_clock(clock: SharedClock, sample_rate: u32, channels: u16) -> Arc<Self> {
        Arc::new(Self {
            clock,
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            sources: Arc::new(RwLock::new(Vec::new())),
            state: Mutex::new(ContextState::Running),
            output: Mutex::new(None),
            device_name: None,
        })
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current clock time in seconds
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn state(&self) -> ContextState {
        *self.state.lock()
    }

    /// Route a source into the output
    pub fn connect(&self, source: Arc<dyn RenderSource>) {
        let mut sources = self.sources.write();
        if !sources.iter().any(|s| Arc::ptr_eq(s, &source)) {
            sources.push(source);
        }
    }

    pub fn disconnect(&self, source: &Arc<dyn RenderSource>) {
        self.sources.write().retain(|s| !Arc::ptr_eq(s, source));
    }

    /// Make sure the context can play, resuming it if suspended
    ///
    /// Stream errors reported by the device (for example a device change) are
    /// treated as a suspension and answered by a resume; playback continues
    /// from the true current clock time.
    pub fn ensure_running(&self) -> Result<(), EngineError> {
        let mut failed = false;
        if let Some(output) = self.output.lock().as_ref() {
            while let Some(err) = output.check_errors() {
                tracing::warn!("Output stream reported: {}", err);
                failed = true;
            }
        }
        if failed {
            let mut state = self.state.lock();
            if *state != ContextState::Closed {
                // Rebuilt on resume
                self.output.lock().take();
                *state = ContextState::Suspended;
            }
        }

        match self.state() {
            ContextState::Running => Ok(()),
            ContextState::Suspended => self.resume(),
            ContextState::Closed => Err(EngineError::Closed),
        }
    }

    /// Silence the output until resumed
    pub fn suspend(&self) {
        let mut state = self.state.lock();
        if *state != ContextState::Running {
            return;
        }
        if let Some(output) = self.output.lock().as_ref() {
            output.set_paused(true);
        }
        *state = ContextState::Suspended;
        tracing::debug!("Audio context suspended");
    }

    /// Resume a suspended context
    pub fn resume(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        match *state {
            ContextState::Running => return Ok(()),
            ContextState::Closed => return Err(EngineError::Closed),
            ContextState::Suspended => {}
        }

        let mut output = self.output.lock();
        match output.as_ref() {
            Some(stream) if stream.is_running() => stream.set_paused(false),
            _ if self.device_name.is_some() => *output = Some(self.reopen_output()?),
            _ => {}
        }

        *state = ContextState::Running;
        tracing::debug!("Audio context resumed at {:.3}s", self.clock.now());
        Ok(())
    }

    fn reopen_output(&self) -> Result<OutputStream, EngineError> {
        let device = match &self.device_name {
            Some(name) => output_device_by_name(name).or_else(|_| default_output_device())?,
            None => default_output_device()?,
        };
        let render = render_fn(self.clock.clone(), self.sources.clone(), self.sample_rate);
        OutputStream::start(device, self.sample_rate, self.channels, render)
    }

    /// Tear down the output and disconnect every source
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state == ContextState::Closed {
            return;
        }
        if let Some(mut output) = self.output.lock().take() {
            output.stop();
        }
        self.sources.write().clear();
        *state = ContextState::Closed;
        tracing::info!("Audio context closed");
    }

    /// Render one block starting at `start` into `out` (offline pull)
    pub fn render(&self, start: f64, out: &mut [f32]) {
        out.fill(0.0);
        if self.state() != ContextState::Running {
            return;
        }
        let block = RenderBlock {
            start,
            sample_rate: self.sample_rate,
            channels: self.channels,
        };
        for source in self.sources.read().iter() {
            source.render(&block, out);
        }
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}

fn render_fn(clock: SharedClock, sources: Sources, sample_rate: u32) -> RenderFn {
    Arc::new(move |out: &mut [f32], channels: u16| {
        let block = RenderBlock {
            start: clock.now(),
            sample_rate,
            channels,
        };
        // Never block the device thread on a writer
        if let Some(sources) = sources.try_read() {
            for source in sources.iter() {
                source.render(&block, out);
            }
        }
    })
}
