//! Per-track signal paths
//!
//! ```text
//!   buffer source ──► track gain ──┐
//!   buffer source ──► track gain ──┼──► master gain ──► context output
//!   buffer source ──► track gain ──┘
//! ```
//!
//! Channel strips hold the mix controls in dB and outlive sessions; nodes are
//! created per session and carry the derived linear gain.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::audio::buffer::SharedBuffer;
use crate::audio::context::{RenderBlock, RenderSource};
use crate::mix::gain::{db_to_amplitude, GainParam};
use crate::tracks::TrackId;

/// Mix controls of one track
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelStrip {
    /// Last explicit gain, in dB
    pub gain_db: f32,
    pub muted: bool,
    pub solo: bool,
}

impl ChannelStrip {
    /// Linear gain with mute applied
    pub fn amplitude(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            db_to_amplitude(self.gain_db)
        }
    }
}

/// Read-only view of a live node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeInfo {
    pub track_id: TrackId,
    /// Clock time the source starts sounding
    pub start_time: f64,
    /// Seconds skipped at the head of the buffer
    pub buffer_offset: f64,
    /// Current linear gain of the track stage
    pub amplitude: f32,
    pub started: bool,
    pub finished: bool,
}

/// One-shot buffer player
struct BufferSource {
    buffer: SharedBuffer,
    start_time: f64,
    buffer_offset: f64,
    /// Read position in buffer frames once started
    position: Option<f64>,
    finished: bool,
}

impl BufferSource {
    /// Add this source into `out`, scaled by `gain`
    fn render(&mut self, block: &RenderBlock, gain: f32, out: &mut [f32]) {
        if self.finished {
            return;
        }

        let channels = block.channels.max(1) as usize;
        let frames = out.len() / channels;
        let step = self.buffer.sample_rate() as f64 / block.sample_rate as f64;

        let first = match self.position {
            Some(_) => 0,
            None => {
                let until_start = (self.start_time - block.start) * block.sample_rate as f64;
                if until_start >= frames as f64 {
                    return;
                }
                let offset_frames = self.buffer_offset * self.buffer.sample_rate() as f64;
                if until_start >= 0.0 {
                    self.position = Some(offset_frames);
                    until_start.round() as usize
                } else {
                    // Block began after the start time: catch up so the track
                    // stays aligned with the clock
                    self.position = Some(offset_frames - until_start * step);
                    0
                }
            }
        };

        let Some(mut position) = self.position else {
            return;
        };
        let end = self.buffer.frames() as f64;

        for frame in first..frames {
            if position >= end {
                self.finished = true;
                break;
            }
            if gain != 0.0 {
                let base = frame * channels;
                for ch in 0..channels {
                    out[base + ch] += self.buffer.sample_at(position, ch as u16) * gain;
                }
            }
            position += step;
        }

        if position >= end {
            self.finished = true;
        }
        self.position = Some(position);
    }
}

struct TrackNode {
    source: BufferSource,
    gain: GainParam,
}

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<TrackId, TrackNode>,
    strips: HashMap<TrackId, ChannelStrip>,
}

impl GraphInner {
    /// Push the strip's derived gain to the live node, if any
    fn apply(&self, track_id: TrackId) {
        if let Some(node) = self.nodes.get(&track_id) {
            let strip = self.strips.get(&track_id).copied().unwrap_or_default();
            node.gain.set(strip.amplitude());
        }
    }
}

/// Track gain stages and master bus
pub struct MixGraph {
    inner: Mutex<GraphInner>,
    master: GainParam,
}

impl MixGraph {
    pub fn new(master_amplitude: f32) -> Self {
        Self {
            inner: Mutex::new(GraphInner::default()),
            master: GainParam::new(master_amplitude),
        }
    }

    pub fn master(&self) -> &GainParam {
        &self.master
    }

    /// Replace the strip of a track, re-applying it to a live node
    pub fn set_strip(&self, track_id: TrackId, strip: ChannelStrip) {
        let mut inner = self.inner.lock();
        inner.strips.insert(track_id, strip);
        inner.apply(track_id);
    }

    pub fn strip(&self, track_id: TrackId) -> Option<ChannelStrip> {
        self.inner.lock().strips.get(&track_id).copied()
    }

    /// Set a track's gain in dB
    ///
    /// A muted track stays silent; the new value is what unmuting restores.
    pub fn set_gain(&self, track_id: TrackId, db: f32) {
        let mut inner = self.inner.lock();
        inner.strips.entry(track_id).or_default().gain_db = db;
        inner.apply(track_id);
    }

    /// Mute or unmute a track
    ///
    /// Unmuting restores the last explicit gain (0 dB if none was ever set).
    pub fn set_mute(&self, track_id: TrackId, muted: bool) {
        let mut inner = self.inner.lock();
        inner.strips.entry(track_id).or_default().muted = muted;
        inner.apply(track_id);
    }

    /// Solo a track against `members`
    ///
    /// Enabling mutes every other member. Disabling only clears the flag:
    /// tracks muted by an earlier solo stay muted. Returns the tracks muted
    /// by this call.
    pub fn set_solo<I>(&self, track_id: TrackId, solo: bool, members: I) -> Vec<TrackId>
    where
        I: IntoIterator<Item = TrackId>,
    {
        let mut inner = self.inner.lock();
        inner.strips.entry(track_id).or_default().solo = solo;
        if !solo {
            return Vec::new();
        }

        let mut muted = Vec::new();
        for other in members {
            if other == track_id {
                continue;
            }
            inner.strips.entry(other).or_default().muted = true;
            inner.apply(other);
            muted.push(other);
        }
        muted
    }

    /// Create the signal path for a track and schedule its source
    ///
    /// Any previous node of the same track is dropped.
    pub fn add_node(
        &self,
        track_id: TrackId,
        buffer: SharedBuffer,
        start_time: f64,
        buffer_offset: f64,
        amplitude: f32,
    ) {
        let node = TrackNode {
            source: BufferSource {
                buffer,
                start_time,
                buffer_offset: buffer_offset.max(0.0),
                position: None,
                finished: false,
            },
            gain: GainParam::new(amplitude),
        };
        self.inner.lock().nodes.insert(track_id, node);
    }

    pub fn remove_node(&self, track_id: TrackId) -> bool {
        self.inner.lock().nodes.remove(&track_id).is_some()
    }

    /// Stop and release every source
    pub fn clear_nodes(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.nodes.len();
        inner.nodes.clear();
        count
    }

    pub fn node(&self, track_id: TrackId) -> Option<NodeInfo> {
        self.inner.lock().nodes.get(&track_id).map(|node| NodeInfo {
            track_id,
            start_time: node.source.start_time,
            buffer_offset: node.source.buffer_offset,
            amplitude: node.gain.get(),
            started: node.source.position.is_some(),
            finished: node.source.finished,
        })
    }

    /// Track ids with a live node
    pub fn node_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<_> = self.inner.lock().nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }
}

impl Default for MixGraph {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RenderSource for MixGraph {
    fn render(&self, block: &RenderBlock, out: &mut [f32]) {
        let master = self.master.get();
        let mut inner = self.inner.lock();
        for node in inner.nodes.values_mut() {
            let gain = node.gain.get() * master;
            node.source.render(block, gain, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::DecodedBuffer;
    use std::sync::Arc;

    fn ones(frames: usize, sample_rate: u32) -> SharedBuffer {
        Arc::new(DecodedBuffer::new(vec![1.0; frames], 1, sample_rate))
    }

    fn block(start: f64) -> RenderBlock {
        RenderBlock {
            start,
            sample_rate: 1000,
            channels: 1,
        }
    }

    #[test]
    fn test_unmute_restores_last_explicit_gain() {
        let graph = MixGraph::default();
        graph.add_node(1, ones(10, 1000), 0.0, 0.0, 1.0);

        graph.set_gain(1, -6.0);
        graph.set_mute(1, true);
        assert_eq!(graph.node(1).unwrap().amplitude, 0.0);

        graph.set_mute(1, false);
        assert!((graph.node(1).unwrap().amplitude - db_to_amplitude(-6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_unmute_without_explicit_gain_is_unity() {
        let graph = MixGraph::default();
        graph.add_node(1, ones(10, 1000), 0.0, 0.0, 0.25);
        graph.set_mute(1, true);
        graph.set_mute(1, false);
        assert!((graph.node(1).unwrap().amplitude - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gain_while_muted_stays_silent() {
        let graph = MixGraph::default();
        graph.add_node(1, ones(10, 1000), 0.0, 0.0, 1.0);
        graph.set_mute(1, true);
        graph.set_gain(1, 6.0);
        assert_eq!(graph.node(1).unwrap().amplitude, 0.0);

        graph.set_mute(1, false);
        assert!((graph.node(1).unwrap().amplitude - db_to_amplitude(6.0)).abs() < 1e-5);
    }

    #[test]
    fn test_solo_is_one_way() {
        let graph = MixGraph::default();
        for id in 1..=3 {
            graph.add_node(id, ones(10, 1000), 0.0, 0.0, 1.0);
        }

        let muted = graph.set_solo(1, true, [1, 2, 3]);
        assert_eq!(muted, vec![2, 3]);
        assert_eq!(graph.node(1).unwrap().amplitude, 1.0);
        assert_eq!(graph.node(2).unwrap().amplitude, 0.0);
        assert_eq!(graph.node(3).unwrap().amplitude, 0.0);

        let muted = graph.set_solo(1, false, [1, 2, 3]);
        assert!(muted.is_empty());
        assert!(!graph.strip(1).unwrap().solo);
        assert_eq!(graph.node(2).unwrap().amplitude, 0.0);
        assert_eq!(graph.node(3).unwrap().amplitude, 0.0);
        assert!(graph.strip(2).unwrap().muted);
    }

    #[test]
    fn test_controls_without_nodes_are_kept() {
        let graph = MixGraph::default();
        graph.set_gain(9, -12.0);
        graph.set_mute(9, true);
        assert_eq!(
            graph.strip(9),
            Some(ChannelStrip {
                gain_db: -12.0,
                muted: true,
                solo: false
            })
        );
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_source_starts_at_scheduled_frame() {
        let graph = MixGraph::default();
        graph.add_node(1, ones(100, 1000), 0.005, 0.0, 0.5);

        let mut out = vec![0.0; 10];
        graph.render(&block(0.0), &mut out);

        assert_eq!(&out[..5], &[0.0; 5]);
        assert_eq!(&out[5..], &[0.5; 5]);
        assert!(graph.node(1).unwrap().started);
    }

    #[test]
    fn test_source_waits_for_later_block() {
        let graph = MixGraph::default();
        graph.add_node(1, ones(100, 1000), 1.0, 0.0, 1.0);

        let mut out = vec![0.0; 10];
        graph.render(&block(0.0), &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(!graph.node(1).unwrap().started);
    }

    #[test]
    fn test_buffer_offset_skips_head() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let buffer = Arc::new(DecodedBuffer::new(samples, 1, 1000));
        let graph = MixGraph::default();
        graph.add_node(1, buffer, 0.0, 0.02, 1.0);

        let mut out = vec![0.0; 3];
        graph.render(&block(0.0), &mut out);
        for (got, want) in out.iter().zip([20.0, 21.0, 22.0]) {
            assert!((got - want).abs() < 1e-3);
        }
    }

    #[test]
    fn test_source_finishes_and_master_applies() {
        let graph = MixGraph::new(0.5);
        graph.add_node(1, ones(4, 1000), 0.0, 0.0, 1.0);

        let mut out = vec![0.0; 8];
        graph.render(&block(0.0), &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert!(graph.node(1).unwrap().finished);
    }

    #[test]
    fn test_late_block_catches_up() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let buffer = Arc::new(DecodedBuffer::new(samples, 1, 1000));
        let graph = MixGraph::default();
        graph.add_node(1, buffer, 0.0, 0.0, 1.0);

        // First block arrives 10 ms after the scheduled start
        let mut out = vec![0.0; 2];
        graph.render(&block(0.010), &mut out);
        assert!((out[0] - 10.0).abs() < 1e-3);
        assert!((out[1] - 11.0).abs() < 1e-3);
    }

    #[test]
    fn test_clear_nodes() {
        let graph = MixGraph::default();
        graph.add_node(1, ones(10, 1000), 0.0, 0.0, 1.0);
        graph.add_node(2, ones(10, 1000), 0.0, 0.0, 1.0);
        assert_eq!(graph.node_ids(), vec![1, 2]);
        assert_eq!(graph.clear_nodes(), 2);

        let mut out = vec![0.0; 4];
        graph.render(&block(0.0), &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
