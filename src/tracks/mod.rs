//! Track metadata consumed by the engine

pub mod track;

pub use track::{session_duration, Track, TrackId, TrackKind};
