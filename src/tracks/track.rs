//! Track records as delivered by the project service
//!
//! The engine never persists these; it reads them and keeps a working copy
//! for the current transport cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Track identity (stable for the lifetime of a take)
pub type TrackId = u64;

/// Lowest gain the UI allows, in dB
pub const MIN_GAIN_DB: f32 = -60.0;

/// Highest gain the UI allows, in dB
pub const MAX_GAIN_DB: f32 = 12.0;

/// Instrument / role of a take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[serde(alias = "voice")]
    Vocal,
    Guitar,
    Bass,
    Drums,
    Keys,
    #[default]
    #[serde(other)]
    Other,
}

/// A recorded take and its mix settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    #[serde(default)]
    pub kind: TrackKind,
    /// Storage locator of the uploaded take
    pub path_original: String,
    /// Storage locator of the transcoded WAV, when the server produced one
    #[serde(default)]
    pub path_wav: Option<String>,
    pub duration_ms: u64,
    /// Alignment shift; negative values start the take later
    #[serde(default)]
    pub offset_ms: i64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_sample_rate() -> u32 {
    crate::constants::DEFAULT_SAMPLE_RATE
}

impl Track {
    /// Create a track with neutral mix settings
    pub fn new(id: TrackId, path_original: impl Into<String>, duration_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: TrackKind::Other,
            path_original: path_original.into(),
            path_wav: None,
            duration_ms,
            offset_ms: 0,
            sample_rate: crate::constants::DEFAULT_SAMPLE_RATE,
            gain_db: 0.0,
            mute: false,
            solo: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Locator to fetch: the transcoded file when present, else the original
    pub fn source_locator(&self) -> &str {
        self.path_wav.as_deref().unwrap_or(&self.path_original)
    }

    /// End of this take on the session timeline, in seconds (may be negative)
    pub fn end_time_secs(&self) -> f64 {
        (self.duration_ms as f64 + self.offset_ms as f64) / 1000.0
    }

    /// Gain clamped to the range the UI exposes
    pub fn clamped_gain_db(&self) -> f32 {
        self.gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    }

    pub fn with_offset(mut self, offset_ms: i64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    pub fn with_gain(mut self, gain_db: f32) -> Self {
        self.gain_db = gain_db;
        self
    }

    pub fn with_kind(mut self, kind: TrackKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn muted(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    pub fn soloed(mut self, solo: bool) -> Self {
        self.solo = solo;
        self
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Length of the session timeline in seconds
///
/// Muted tracks contribute too; the result is never negative.
pub fn session_duration(tracks: &[Track]) -> f64 {
    tracks
        .iter()
        .map(Track::end_time_secs)
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_duration_uses_offsets() {
        let tracks = vec![
            Track::new(1, "a.wav", 1000).with_offset(200),
            Track::new(2, "b.wav", 2000).with_offset(-100),
        ];
        assert!((session_duration(&tracks) - 1.9).abs() < 1e-9);
    }

    #[test]
    fn test_session_duration_clamps_negative() {
        let tracks = vec![Track::new(1, "a.wav", 100).with_offset(-5000)];
        assert_eq!(session_duration(&tracks), 0.0);
        assert_eq!(session_duration(&[]), 0.0);
    }

    #[test]
    fn test_prefers_transcoded_locator() {
        let mut track = Track::new(7, "takes/7.webm", 1000);
        assert_eq!(track.source_locator(), "takes/7.webm");

        track.path_wav = Some("takes/7.wav".into());
        assert_eq!(track.source_locator(), "takes/7.wav");
    }

    #[test]
    fn test_deserialize_service_payload() {
        let json = r#"{
            "id": 3,
            "kind": "voice",
            "path_original": "tracks/3.webm",
            "path_wav": null,
            "duration_ms": 4200,
            "offset_ms": -120,
            "sample_rate": 48000,
            "gain_db": -3.5,
            "mute": false,
            "solo": true,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:05:00Z"
        }"#;

        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.kind, TrackKind::Vocal);
        assert_eq!(track.offset_ms, -120);
        assert!(track.solo);
        assert!(track.path_wav.is_none());
    }

    #[test]
    fn test_unknown_kind_maps_to_other() {
        let json = r#"{"id": 1, "kind": "theremin", "path_original": "x", "duration_ms": 1}"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.kind, TrackKind::Other);
    }
}
