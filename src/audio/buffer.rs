//! Decoded PCM buffers
//!
//! A `DecodedBuffer` is produced once per take by the decoder and then shared
//! read-only between the cache and every voice that plays it.

use std::sync::Arc;

/// Shared handle to an immutable decoded buffer
pub type SharedBuffer = Arc<DecodedBuffer>;

/// Immutable decoded audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    /// Interleaved audio samples (f32)
    samples: Vec<f32>,
    /// Number of channels
    channels: u16,
    /// Native sample rate of the take
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Wrap interleaved samples
    ///
    /// A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Build from one vector per channel
    pub fn from_planar(planes: &[Vec<f32>], sample_rate: u32) -> Self {
        let channels = planes.len().max(1);
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for plane in planes {
                samples.push(plane[frame]);
            }
        }
        Self::new(samples, channels as u16, sample_rate)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample of `channel` at integer frame `frame`
    ///
    /// Mono buffers feed every output channel; wider buffers fold extra output
    /// channels onto their last channel. Out-of-range frames are silent.
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        if frame >= self.frames() {
            return 0.0;
        }
        let ch = channel.min(self.channels - 1) as usize;
        self.samples[frame * self.channels as usize + ch]
    }

    /// Linearly interpolated sample at a fractional frame position
    pub fn sample_at(&self, position: f64, channel: u16) -> f32 {
        if position < 0.0 {
            return 0.0;
        }
        let index = position.floor() as usize;
        let frac = (position - index as f64) as f32;
        let a = self.sample(index, channel);
        if frac == 0.0 {
            return a;
        }
        let b = self.sample(index + 1, channel);
        a + (b - a) * frac
    }
}
