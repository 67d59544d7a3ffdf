//! # multitake
//!
//! Sample-accurate playback of recorded takes on a shared timeline, with a
//! metronome running off the same clock.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         TransportController                           │
//! │   play / pause / stop / seek        gain / mute / solo / offset       │
//! │        │                                        │                     │
//! │        ▼                                        ▼                     │
//! │  ┌──────────────┐   SharedBuffer   ┌──────────────────────────────┐   │
//! │  │ BufferCache  │ ───────────────▶ │           MixGraph           │   │
//! │  │ (loader)     │                  │  node ─ gain ─┐              │   │
//! │  └──────┬───────┘                  │  node ─ gain ─┼─▶ master ──┐ │   │
//! │         │ fetch + decode           │  node ─ gain ─┘            │ │   │
//! │         ▼                          └────────────────────────────┼─┘   │
//! │  ┌──────────────┐                                               │     │
//! │  │ TrackFetcher │  HTTP storage / local files / memory          │     │
//! │  └──────────────┘                                               │     │
//! └─────────────────────────────────────────────────────────────────┼─────┘
//!                                                                   │
//! ┌──────────────┐   ClickBus                                       │
//! │  Metronome   │ ──────────────────────────────────────────┐      │
//! └──────┬───────┘                                           ▼      ▼
//!        │ polls           ┌──────────────────────────────────────────────┐
//!        └───────────────▶ │  AudioContext (ClockSource + output stream)  │
//!                          │        cpal device thread sums sources       │
//!                          └──────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod loader;
pub mod metronome;
pub mod mix;
pub mod tracks;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio output
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Delay between `play()` and the first scheduled sample
    pub const DEFAULT_LOOKAHEAD_MS: u64 = 100;

    /// Pause before a seek restarts playback
    pub const DEFAULT_SEEK_RESTART_DELAY_MS: u64 = 100;

    /// Elapsed-time reporting period (about one display frame)
    pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 16;

    /// Base URL of the storage API
    pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

    /// Metronome polling period
    pub const DEFAULT_METRONOME_POLL_MS: u64 = 16;

    /// Metronome master gain (linear)
    pub const DEFAULT_METRONOME_GAIN: f32 = 0.5;

    pub const DEFAULT_BPM: u32 = 120;

    /// Count-in length in bars
    pub const DEFAULT_COUNT_IN_BARS: u32 = 2;
}
