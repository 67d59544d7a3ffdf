//! Synchronized multitrack transport

pub mod controller;
pub mod session;

pub use controller::{PlayReport, TransportController, TransportState, TransportStatus};
pub use session::{PlaybackSession, SessionToken};
