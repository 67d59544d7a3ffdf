//! Playback sessions
//!
//! A session is one transport cycle: the tracks started together and the
//! single clock instant they are aligned to. Every `play`, `pause` and `stop`
//! issues a new token; work tagged with an older token is stale.

use std::fmt;

use crate::tracks::{Track, TrackId};

/// Generation number of a transport cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A running transport cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub token: SessionToken,
    /// Clock time all tracks are aligned to
    pub start_time: f64,
    /// Timeline length in seconds
    pub duration: f64,
    /// Tracks with a live node, in request order
    pub track_ids: Vec<TrackId>,
}

impl PlaybackSession {
    /// Elapsed session time at clock time `now`, never negative
    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.start_time).max(0.0)
    }
}

/// Where a track's source is placed relative to the session start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Seconds after the session start before the source sounds
    pub delay: f64,
    /// Seconds skipped at the head of the buffer
    pub buffer_offset: f64,
}

impl Placement {
    /// Positive offsets seek into the take; negative ones delay its start
    pub fn for_track(track: &Track) -> Self {
        let offset = track.offset_ms as f64 / 1000.0;
        if offset < 0.0 {
            Self {
                delay: -offset,
                buffer_offset: 0.0,
            }
        } else {
            Self {
                delay: 0.0,
                buffer_offset: offset,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_offset_delays_start() {
        let placement = Placement::for_track(&Track::new(1, "a", 1000).with_offset(-250));
        assert_eq!(placement.delay, 0.25);
        assert_eq!(placement.buffer_offset, 0.0);
    }

    #[test]
    fn test_positive_offset_seeks_into_buffer() {
        let placement = Placement::for_track(&Track::new(1, "a", 1000).with_offset(200));
        assert_eq!(placement.delay, 0.0);
        assert!((placement.buffer_offset - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_elapsed_is_clamped() {
        let session = PlaybackSession {
            token: SessionToken::default().next(),
            start_time: 10.0,
            duration: 2.0,
            track_ids: vec![1],
        };
        assert_eq!(session.elapsed(9.9), 0.0);
        assert!((session.elapsed(10.5) - 0.5).abs() < 1e-12);
        assert_eq!(session.token.to_string(), "#1");
    }
}
