//! Gain conversions and lock-free gain parameters

use crossbeam::atomic::AtomicCell;

/// Linear amplitude for a gain in dB: `10^(db/20)`
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Gain in dB for a linear amplitude; silence maps to negative infinity
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * amplitude.log10()
    }
}

/// Linear gain readable from the audio thread without locking
#[derive(Debug)]
pub struct GainParam {
    value: AtomicCell<f32>,
}

impl GainParam {
    pub fn new(amplitude: f32) -> Self {
        Self {
            value: AtomicCell::new(amplitude),
        }
    }

    pub fn unity() -> Self {
        Self::new(1.0)
    }

    /// Set immediately; no ramp
    pub fn set(&self, amplitude: f32) {
        self.value.store(amplitude.max(0.0));
    }

    pub fn set_db(&self, db: f32) {
        self.set(db_to_amplitude(db));
    }

    pub fn get(&self) -> f32 {
        self.value.load()
    }
}

impl Default for GainParam {
    fn default() -> Self {
        Self::unity()
    }
}
