//! Transport controller
//!
//! Drives play/pause/stop/seek for a set of tracks against the context clock.
//!
//! ```text
//!   Idle ──play──► Loading ──all resolved──► Playing ──pause──► Paused
//!                     │                         │
//!                     └────────stop─────────────┴──stop──► Stopped
//! ```
//!
//! `play` resolves every unmuted track concurrently, then starts all sources
//! at one shared clock instant. A `play` overtaken by `pause`, `stop` or a
//! newer `play` while resolving never starts its sources.

use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio::context::{AudioContext, RenderSource};
use crate::clock::SharedClock;
use crate::config::TransportConfig;
use crate::error::{LoadError, Result};
use crate::loader::BufferCache;
use crate::mix::{db_to_amplitude, ChannelStrip, MixGraph, NodeInfo};
use crate::tracks::{session_duration, Track, TrackId};
use crate::transport::session::{PlaybackSession, Placement, SessionToken};

/// Transport state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
}

/// Snapshot published to observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportStatus {
    pub state: TransportState,
    /// Elapsed session time in seconds
    pub current_time: f64,
    /// Timeline length in seconds
    pub duration: f64,
}

impl Default for TransportStatus {
    fn default() -> Self {
        Self {
            state: TransportState::Idle,
            current_time: 0.0,
            duration: 0.0,
        }
    }
}

/// Outcome of a `play` call
#[derive(Debug, Clone, PartialEq)]
pub struct PlayReport {
    pub token: SessionToken,
    /// Tracks whose sources were scheduled
    pub started: Vec<TrackId>,
    /// Tracks left out of the mix
    pub failed: Vec<LoadError>,
    /// Muted tracks that were not loaded
    pub skipped: Vec<TrackId>,
    /// True when a later transport command overtook this call
    pub superseded: bool,
}

struct TransportInner {
    state: TransportState,
    token: SessionToken,
    tracks: Vec<Track>,
    session: Option<PlaybackSession>,
    duration: f64,
    /// Position kept across a pause
    paused_at: f64,
    reporter: Option<JoinHandle<()>>,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        // Last controller handle gone while playing
        if let Some(reporter) = self.reporter.take() {
            reporter.abort();
        }
    }
}

/// Multitrack transport bound to one audio context
#[derive(Clone)]
pub struct TransportController {
    context: Arc<AudioContext>,
    cache: Arc<BufferCache>,
    graph: Arc<MixGraph>,
    config: TransportConfig,
    inner: Arc<Mutex<TransportInner>>,
    status_tx: Arc<watch::Sender<TransportStatus>>,
}

impl TransportController {
    /// Create a transport and route its mix bus into `context`
    pub fn new(context: Arc<AudioContext>, cache: Arc<BufferCache>, config: TransportConfig) -> Self {
        let graph = Arc::new(MixGraph::new(1.0));
        context.connect(graph.clone() as Arc<dyn RenderSource>);

        let (status_tx, _) = watch::channel(TransportStatus::default());

        Self {
            context,
            cache,
            graph,
            config,
            inner: Arc::new(Mutex::new(TransportInner {
                state: TransportState::Idle,
                token: SessionToken::default(),
                tracks: Vec::new(),
                session: None,
                duration: 0.0,
                paused_at: 0.0,
                reporter: None,
            })),
            status_tx: Arc::new(status_tx),
        }
    }

    fn clock(&self) -> &SharedClock {
        self.context.clock()
    }

    /// Play `tracks` from their offsets as one synchronized session
    ///
    /// Per-track load failures are logged and reported, never returned as an
    /// error. An unusable audio context aborts the call and leaves the
    /// transport `Idle`.
    pub async fn play(&self, tracks: Vec<Track>) -> Result<PlayReport> {
        if let Err(e) = self.context.ensure_running() {
            tracing::error!("Cannot start playback: {}", e);
            let mut inner = self.inner.lock();
            self.teardown(&mut inner);
            inner.token = inner.token.next();
            inner.state = TransportState::Idle;
            self.publish(&inner);
            return Err(e.into());
        }

        let token = {
            let mut inner = self.inner.lock();
            self.teardown(&mut inner);
            inner.token = inner.token.next();
            inner.state = TransportState::Loading;
            inner.duration = session_duration(&tracks);
            inner.paused_at = 0.0;
            for track in &tracks {
                self.graph.set_strip(
                    track.id,
                    ChannelStrip {
                        gain_db: track.gain_db,
                        muted: track.mute,
                        solo: track.solo,
                    },
                );
            }
            inner.tracks = tracks.clone();
            self.publish(&inner);
            inner.token
        };

        tracing::info!("Session {}: loading {} tracks", token, tracks.len());

        let (active, skipped): (Vec<&Track>, Vec<&Track>) = tracks.iter().partition(|t| !t.mute);
        let resolved = join_all(active.iter().map(|track| async move {
            let result = self.cache.resolve(track).await;
            (*track, result)
        }))
        .await;

        let mut report = PlayReport {
            token,
            started: Vec::new(),
            failed: Vec::new(),
            skipped: skipped.iter().map(|t| t.id).collect(),
            superseded: false,
        };

        let mut inner = self.inner.lock();
        if inner.token != token {
            tracing::debug!("Session {} superseded by {}, discarding", token, inner.token);
            report.superseded = true;
            return Ok(report);
        }

        let start_time = self.clock().now() + self.config.lookahead_secs();
        for (track, result) in resolved {
            match result {
                Ok(buffer) => {
                    let placement = Placement::for_track(track);
                    // Controls issued while loading have already landed on the strip
                    let strip = self.graph.strip(track.id).unwrap_or(ChannelStrip {
                        gain_db: track.gain_db,
                        muted: track.mute,
                        solo: track.solo,
                    });
                    let amplitude = if strip.muted {
                        0.0
                    } else if strip.solo {
                        1.0
                    } else {
                        db_to_amplitude(strip.gain_db)
                    };
                    self.graph.add_node(
                        track.id,
                        buffer,
                        start_time + placement.delay,
                        placement.buffer_offset,
                        amplitude,
                    );
                    report.started.push(track.id);
                }
                Err(e) => {
                    tracing::warn!("Session {}: track {} left out: {}", token, track.id, e);
                    report.failed.push(e);
                }
            }
        }

        let session = PlaybackSession {
            token,
            start_time,
            duration: inner.duration,
            track_ids: report.started.clone(),
        };
        inner.reporter = Some(self.spawn_reporter(&session));
        inner.session = Some(session);
        inner.state = TransportState::Playing;
        self.publish(&inner);

        tracing::info!(
            "Session {}: playing {} tracks at {:.3}s ({} failed, {} muted)",
            token,
            report.started.len(),
            start_time,
            report.failed.len(),
            report.skipped.len()
        );

        Ok(report)
    }

    /// Release every source, remembering the position
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        let now = self.clock().now();
        let position = match (&inner.session, inner.state) {
            (Some(session), TransportState::Playing) => session.elapsed(now),
            (_, TransportState::Paused) => inner.paused_at,
            _ => 0.0,
        };
        self.teardown(&mut inner);
        inner.token = inner.token.next();
        inner.paused_at = position;
        if inner.state != TransportState::Idle || !inner.tracks.is_empty() {
            inner.state = TransportState::Paused;
        }
        self.publish(&inner);
        tracing::debug!("Transport paused at {:.3}s", position);
    }

    /// Release every source and rewind to zero
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        self.teardown(&mut inner);
        inner.token = inner.token.next();
        inner.paused_at = 0.0;
        if inner.state != TransportState::Idle {
            inner.state = TransportState::Stopped;
        }
        self.publish(&inner);
        tracing::debug!("Transport stopped");
    }

    /// Restart the current track set
    ///
    /// Pauses, waits the configured restart delay, then plays the same tracks
    /// again from their offsets. The requested time is not used to position
    /// the sources. Returns `None` when there is nothing to play or another
    /// transport command arrived during the delay.
    pub async fn seek(&self, time: f64) -> Result<Option<PlayReport>> {
        let tracks = self.inner.lock().tracks.clone();
        if tracks.is_empty() {
            return Ok(None);
        }

        tracing::debug!("Seek to {:.3}s: restarting {} tracks", time, tracks.len());
        self.pause();
        let token = self.inner.lock().token;

        tokio::time::sleep(self.config.seek_restart_delay()).await;

        let current = self.inner.lock().token;
        if current != token {
            tracing::debug!("Seek abandoned, transport moved to {}", current);
            return Ok(None);
        }

        let tracks = self.inner.lock().tracks.clone();
        self.play(tracks).await.map(Some)
    }

    /// Set a track's gain in dB, live if it is playing
    pub fn set_gain(&self, track_id: TrackId, gain_db: f32) {
        let mut inner = self.inner.lock();
        if let Some(track) = inner.tracks.iter_mut().find(|t| t.id == track_id) {
            track.gain_db = gain_db;
            track.touch();
        }
        self.graph.set_gain(track_id, gain_db);
    }

    /// Mute or unmute a track
    pub fn set_mute(&self, track_id: TrackId, mute: bool) {
        let mut inner = self.inner.lock();
        if let Some(track) = inner.tracks.iter_mut().find(|t| t.id == track_id) {
            track.mute = mute;
            track.touch();
        }
        self.graph.set_mute(track_id, mute);
    }

    /// Solo a track against the current track set
    ///
    /// Turning solo on mutes every other track; turning it off leaves them
    /// muted.
    pub fn set_solo(&self, track_id: TrackId, solo: bool) {
        let mut inner = self.inner.lock();
        let members: Vec<TrackId> = inner.tracks.iter().map(|t| t.id).collect();
        let muted = self.graph.set_solo(track_id, solo, members);

        for track in inner.tracks.iter_mut() {
            if track.id == track_id {
                track.solo = solo;
                track.touch();
            } else if muted.contains(&track.id) {
                track.mute = true;
                track.touch();
            }
        }
        if !muted.is_empty() {
            tracing::debug!("Solo on track {} muted {:?}", track_id, muted);
        }
    }

    /// Change a track's alignment; applies from the next play or seek
    pub fn set_offset(&self, track_id: TrackId, offset_ms: i64) {
        let mut inner = self.inner.lock();
        if let Some(track) = inner.tracks.iter_mut().find(|t| t.id == track_id) {
            track.offset_ms = offset_ms;
            track.touch();
        }
    }

    pub fn state(&self) -> TransportState {
        self.inner.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    /// Elapsed session time in seconds
    pub fn position(&self) -> f64 {
        let inner = self.inner.lock();
        self.position_of(&inner)
    }

    pub fn duration(&self) -> f64 {
        self.inner.lock().duration
    }

    pub fn status(&self) -> TransportStatus {
        let inner = self.inner.lock();
        TransportStatus {
            state: inner.state,
            current_time: self.position_of(&inner),
            duration: inner.duration,
        }
    }

    /// Receive status updates, including periodic elapsed time while playing
    pub fn subscribe(&self) -> watch::Receiver<TransportStatus> {
        self.status_tx.subscribe()
    }

    /// Current session, if playing
    pub fn session(&self) -> Option<PlaybackSession> {
        self.inner.lock().session.clone()
    }

    /// Working copy of the track set
    pub fn tracks(&self) -> Vec<Track> {
        self.inner.lock().tracks.clone()
    }

    /// Live signal paths
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.graph
            .node_ids()
            .into_iter()
            .filter_map(|id| self.graph.node(id))
            .collect()
    }

    pub fn node(&self, track_id: TrackId) -> Option<NodeInfo> {
        self.graph.node(track_id)
    }

    pub fn strip(&self, track_id: TrackId) -> Option<ChannelStrip> {
        self.graph.strip(track_id)
    }

    pub fn set_master_gain(&self, gain_db: f32) {
        self.graph.master().set_db(gain_db);
    }

    pub fn cache(&self) -> &Arc<BufferCache> {
        &self.cache
    }

    /// Stop and detach the mix bus from the context
    pub fn close(&self) {
        self.stop();
        let graph: Arc<dyn RenderSource> = self.graph.clone();
        self.context.disconnect(&graph);
    }

    fn position_of(&self, inner: &TransportInner) -> f64 {
        match (inner.state, &inner.session) {
            (TransportState::Playing, Some(session)) => session.elapsed(self.clock().now()),
            (TransportState::Paused, _) => inner.paused_at,
            _ => 0.0,
        }
    }

    fn teardown(&self, inner: &mut TransportInner) {
        if let Some(reporter) = inner.reporter.take() {
            reporter.abort();
        }
        let released = self.graph.clear_nodes();
        if let Some(session) = inner.session.take() {
            tracing::debug!("Session {} torn down ({} nodes)", session.token, released);
        }
    }

    fn publish(&self, inner: &TransportInner) {
        self.status_tx.send_replace(TransportStatus {
            state: inner.state,
            current_time: self.position_of(inner),
            duration: inner.duration,
        });
    }

    fn spawn_reporter(&self, session: &PlaybackSession) -> JoinHandle<()> {
        let clock = self.clock().clone();
        let status_tx = self.status_tx.clone();
        let start_time = session.start_time;
        let duration = session.duration;
        let period = self.config.report_interval();

        tokio::spawn(async move {
            let mut ticker = clock.interval_from(clock.now(), period);
            loop {
                ticker.tick().await;
                let elapsed = (clock.now() - start_time).max(0.0);
                status_tx.send_replace(TransportStatus {
                    state: TransportState::Playing,
                    current_time: elapsed,
                    duration,
                });
            }
        })
    }
}
