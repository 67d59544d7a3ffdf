//! Error types for the playback engine

use thiserror::Error;

use crate::tracks::TrackId;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host audio subsystem errors
///
/// These are session-level: they abort a `play()` or metronome start before
/// any node is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("No audio subsystem available: {0}")]
    UnsupportedEnvironment(String),

    #[error("Capture device access denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Audio context is closed")]
    Closed,
}

/// Per-track buffer resolution errors
///
/// Never fatal for a multi-track session: the failing track is left out of
/// the mix and the rest keep playing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Fetch failed for track {track_id} with status {status}")]
    Fetch { track_id: TrackId, status: u16 },

    #[error("Connection failed for track {track_id}: {reason}")]
    Connect { track_id: TrackId, reason: String },

    #[error("Decode failed for track {track_id}: {reason}")]
    Decode { track_id: TrackId, reason: String },
}

impl LoadError {
    /// Track the error belongs to
    pub fn track_id(&self) -> TrackId {
        match self {
            LoadError::Fetch { track_id, .. }
            | LoadError::Connect { track_id, .. }
            | LoadError::Decode { track_id, .. } => *track_id,
        }
    }

    /// Whether this is a fetch-side failure (status or connectivity)
    pub fn is_fetch(&self) -> bool {
        matches!(self, LoadError::Fetch { .. } | LoadError::Connect { .. })
    }
}

/// Audio decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unrecognized format: {0}")]
    Probe(String),

    #[error("No audio track in stream")]
    NoTrack,

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Stream contains no audio frames")]
    Empty,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config directory available")]
    NoConfigDir,

    #[error("Invalid value: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
