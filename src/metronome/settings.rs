//! Tempo settings and beat arithmetic

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BPM, DEFAULT_COUNT_IN_BARS};

/// Beats per bar over the note value of one beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u32,
    pub beat_unit: u32,
}

impl TimeSignature {
    pub const fn new(beats_per_bar: u32, beat_unit: u32) -> Self {
        Self {
            beats_per_bar,
            beat_unit,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// Metronome configuration
///
/// BPM is not range-checked; the UI keeps it within 60..=200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    /// Bars played before recording starts
    pub count_in: u32,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            count_in: DEFAULT_COUNT_IN_BARS,
        }
    }
}

impl MetronomeSettings {
    /// Seconds per beat
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.bpm.max(1) as f64
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.time_signature.beats_per_bar.max(1)
    }

    /// Beats in the count-in
    pub fn count_in_beats(&self) -> u64 {
        self.count_in as u64 * self.beats_per_bar() as u64
    }

    /// Length of the count-in in seconds
    pub fn count_in_duration(&self) -> f64 {
        self.count_in_beats() as f64 * self.beat_interval()
    }

    /// Apply a partial update
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(bpm) = update.bpm {
            self.bpm = bpm;
        }
        if let Some(time_signature) = update.time_signature {
            self.time_signature = time_signature;
        }
        if let Some(count_in) = update.count_in {
            self.count_in = count_in;
        }
    }
}

/// Partial settings change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub bpm: Option<u32>,
    pub time_signature: Option<TimeSignature>,
    pub count_in: Option<u32>,
}

impl SettingsUpdate {
    pub fn bpm(bpm: u32) -> Self {
        Self {
            bpm: Some(bpm),
            ..Self::default()
        }
    }

    pub fn time_signature(beats_per_bar: u32, beat_unit: u32) -> Self {
        Self {
            time_signature: Some(TimeSignature::new(beats_per_bar, beat_unit)),
            ..Self::default()
        }
    }

    pub fn count_in(bars: u32) -> Self {
        Self {
            count_in: Some(bars),
            ..Self::default()
        }
    }
}

/// Beat and bar reached after some elapsed time, all 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeatPosition {
    pub beat: u64,
    pub bar: u64,
    pub beat_in_bar: u32,
}

impl BeatPosition {
    pub fn at(elapsed: f64, settings: &MetronomeSettings) -> Self {
        let elapsed = elapsed.max(0.0);
        let beats_per_bar = settings.beats_per_bar() as u64;
        let beat = (elapsed / settings.beat_interval()).floor() as u64 + 1;
        let bar = (beat - 1) / beats_per_bar + 1;
        let beat_in_bar = ((beat - 1) % beats_per_bar + 1) as u32;
        Self {
            beat,
            bar,
            beat_in_bar,
        }
    }

    /// First beat of a bar
    pub fn is_downbeat(&self) -> bool {
        self.beat_in_bar == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(elapsed: f64, bpm: u32, beats: u32) -> BeatPosition {
        let settings = MetronomeSettings {
            bpm,
            time_signature: TimeSignature::new(beats, 4),
            count_in: 0,
        };
        BeatPosition::at(elapsed, &settings)
    }

    #[test]
    fn test_120_bpm_common_time() {
        assert_eq!(at(0.0, 120, 4), BeatPosition { beat: 1, bar: 1, beat_in_bar: 1 });
        assert_eq!(at(0.49, 120, 4).beat, 1);
        assert_eq!(at(0.5, 120, 4).beat, 2);
        assert_eq!(at(1.99, 120, 4), BeatPosition { beat: 4, bar: 1, beat_in_bar: 4 });
        assert_eq!(at(2.0, 120, 4), BeatPosition { beat: 5, bar: 2, beat_in_bar: 1 });
        assert!(at(2.0, 120, 4).is_downbeat());
    }

    #[test]
    fn test_three_four() {
        let pos = at(3.0, 60, 3);
        assert_eq!(pos, BeatPosition { beat: 4, bar: 2, beat_in_bar: 1 });
    }

    #[test]
    fn test_degenerate_settings_do_not_panic() {
        let pos = at(1.0, 0, 0);
        assert_eq!(pos.beat_in_bar, 1);
        assert_eq!(at(-3.0, 120, 4).beat, 1);
    }

    #[test]
    fn test_count_in_length() {
        let settings = MetronomeSettings::default();
        assert_eq!(settings.count_in_beats(), 8);
        assert!((settings.count_in_duration() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_update() {
        let mut settings = MetronomeSettings::default();
        settings.apply(SettingsUpdate::bpm(90));
        settings.apply(SettingsUpdate::time_signature(6, 8));
        assert_eq!(settings.bpm, 90);
        assert_eq!(settings.time_signature, TimeSignature::new(6, 8));
        assert_eq!(settings.count_in, 2);
    }
}
