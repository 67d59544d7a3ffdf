//! Metronome: tempo clicks with count-in, on the shared context clock

pub mod click;
pub mod engine;
pub mod settings;

pub use click::{ClickBus, ClickKind};
pub use engine::{Click, Metronome, MetronomeState, MetronomeStatus};
pub use settings::{BeatPosition, MetronomeSettings, SettingsUpdate, TimeSignature};
