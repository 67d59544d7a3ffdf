//! Click synthesis
//!
//! Each click is a short square-wave burst with a 10 ms linear attack to 0.3
//! followed by an exponential decay to 0.01 at the end of the click.

use parking_lot::Mutex;

use crate::audio::context::{RenderBlock, RenderSource};
use crate::mix::GainParam;

const ATTACK_SECS: f64 = 0.01;
const PEAK: f64 = 0.3;
const FLOOR: f64 = 0.01;

/// Audible cue for a beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// First beat of a bar: higher and longer
    Downbeat,
    Beat,
}

impl ClickKind {
    pub fn for_beat_in_bar(beat_in_bar: u32) -> Self {
        if beat_in_bar == 1 {
            ClickKind::Downbeat
        } else {
            ClickKind::Beat
        }
    }

    pub fn frequency(self) -> f64 {
        match self {
            ClickKind::Downbeat => 800.0,
            ClickKind::Beat => 600.0,
        }
    }

    /// Click length in seconds
    pub fn duration(self) -> f64 {
        match self {
            ClickKind::Downbeat => 0.15,
            ClickKind::Beat => 0.1,
        }
    }
}

/// Envelope value `t` seconds into a click of length `duration`
fn envelope(t: f64, duration: f64) -> f64 {
    if t < 0.0 || t >= duration {
        0.0
    } else if t < ATTACK_SECS {
        PEAK * t / ATTACK_SECS
    } else {
        let span = (duration - ATTACK_SECS).max(f64::EPSILON);
        PEAK * (FLOOR / PEAK).powf((t - ATTACK_SECS) / span)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClickVoice {
    kind: ClickKind,
    start: f64,
    /// Set once the voice has been anchored to a render block
    sounding: bool,
}

impl ClickVoice {
    fn end(&self) -> f64 {
        self.start + self.kind.duration()
    }

    fn sample(&self, time: f64) -> f32 {
        let t = time - self.start;
        let env = envelope(t, self.kind.duration());
        if env == 0.0 {
            return 0.0;
        }
        let phase = (t * self.kind.frequency()).fract();
        let square = if phase < 0.5 { 1.0 } else { -1.0 };
        (square * env) as f32
    }
}

/// Output bus for metronome clicks
pub struct ClickBus {
    voices: Mutex<Vec<ClickVoice>>,
    master: GainParam,
}

impl ClickBus {
    pub fn new(master_amplitude: f32) -> Self {
        Self {
            voices: Mutex::new(Vec::new()),
            master: GainParam::new(master_amplitude),
        }
    }

    pub fn master(&self) -> &GainParam {
        &self.master
    }

    /// Sound a click starting at clock time `at`
    ///
    /// A click whose start has already been rendered past begins at the head
    /// of the next block instead, so its attack is never cut.
    pub fn trigger(&self, kind: ClickKind, at: f64) {
        self.voices.lock().push(ClickVoice {
            kind,
            start: at,
            sounding: false,
        });
    }

    /// Silence every pending or sounding click
    pub fn clear(&self) {
        self.voices.lock().clear();
    }

    /// Clicks not yet finished
    pub fn active(&self) -> usize {
        self.voices.lock().len()
    }
}

impl RenderSource for ClickBus {
    fn render(&self, block: &RenderBlock, out: &mut [f32]) {
        let channels = block.channels.max(1) as usize;
        let frames = out.len() / channels;
        let master = self.master.get();
        let block_end = block.frame_time(frames);

        let mut voices = self.voices.lock();
        for voice in voices.iter_mut() {
            if voice.start >= block_end {
                continue;
            }
            if !voice.sounding {
                voice.start = voice.start.max(block.start);
                voice.sounding = true;
            }
            if voice.end() <= block.start {
                continue;
            }
            for frame in 0..frames {
                let value = voice.sample(block.frame_time(frame)) * master;
                if value != 0.0 {
                    for sample in &mut out[frame * channels..(frame + 1) * channels] {
                        *sample += value;
                    }
                }
            }
        }
        voices.retain(|voice| voice.end() > block_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: f64, sample_rate: u32) -> RenderBlock {
        RenderBlock {
            start,
            sample_rate,
            channels: 2,
        }
    }

    #[test]
    fn test_downbeat_is_higher_and_longer() {
        assert!(ClickKind::Downbeat.frequency() > ClickKind::Beat.frequency());
        assert!(ClickKind::Downbeat.duration() > ClickKind::Beat.duration());
        assert_eq!(ClickKind::for_beat_in_bar(1), ClickKind::Downbeat);
        assert_eq!(ClickKind::for_beat_in_bar(3), ClickKind::Beat);
    }

    #[test]
    fn test_envelope_shape() {
        assert_eq!(envelope(0.0, 0.1), 0.0);
        assert!((envelope(0.005, 0.1) - 0.15).abs() < 1e-9);
        assert!((envelope(0.01, 0.1) - 0.3).abs() < 1e-9);
        assert!((envelope(0.0999999, 0.1) - 0.01).abs() < 1e-4);
        assert_eq!(envelope(0.1, 0.1), 0.0);
    }

    #[test]
    fn test_click_renders_and_expires() {
        let bus = ClickBus::new(0.5);
        bus.trigger(ClickKind::Beat, 0.0);

        let mut out = vec![0.0; 2 * 480];
        bus.render(&block(0.0, 48_000), &mut out);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.1 && peak <= 0.15 + 1e-6);
        assert_eq!(out[0], out[1]);
        assert_eq!(bus.active(), 1);

        let mut out = vec![0.0; 2 * 4800];
        bus.render(&block(0.01, 48_000), &mut out);
        assert_eq!(bus.active(), 0);
    }

    #[test]
    fn test_late_click_keeps_its_attack() {
        let bus = ClickBus::new(1.0);
        // Triggered 5 ms before the block that first renders it
        bus.trigger(ClickKind::Beat, 0.0);

        let mut out = vec![0.0; 2 * 480];
        bus.render(&block(0.005, 48_000), &mut out);
        assert_eq!(out[0], 0.0);
        assert!(out[2 * 120].abs() > 0.07 && out[2 * 120].abs() < 0.08);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.29);
    }

    #[test]
    fn test_very_late_click_still_sounds() {
        let bus = ClickBus::new(1.0);
        bus.trigger(ClickKind::Downbeat, 0.0);

        let mut out = vec![0.0; 2 * 480];
        bus.render(&block(1.0, 48_000), &mut out);
        assert!(out.iter().any(|s| *s != 0.0));
        assert_eq!(bus.active(), 1);
    }

    #[test]
    fn test_future_click_waits() {
        let bus = ClickBus::new(1.0);
        bus.trigger(ClickKind::Downbeat, 1.0);

        let mut out = vec![0.0; 2 * 256];
        bus.render(&block(0.0, 48_000), &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(bus.active(), 1);
    }
}
