//! Mix bus: per-track gain stages summed into a master gain

pub mod gain;
pub mod graph;

pub use gain::{amplitude_to_db, db_to_amplitude, GainParam};
pub use graph::{ChannelStrip, MixGraph, NodeInfo};
