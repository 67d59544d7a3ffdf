//! Decoded buffer cache keyed by track identity
//!
//! Buffers are written once per track id and then only read. A locator change
//! under the same id does not invalidate the entry; callers that re-upload a
//! take under an existing id must call `invalidate`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{DecodedBuffer, SharedBuffer};
use crate::codec::decode_audio;
use crate::error::LoadError;
use crate::loader::fetch::{FetchFailure, TrackFetcher};
use crate::tracks::{Track, TrackId};

/// Memoizing fetch-and-decode front end
pub struct BufferCache {
    fetcher: Arc<dyn TrackFetcher>,
    buffers: DashMap<TrackId, SharedBuffer>,
    fetches: AtomicU64,
}

impl BufferCache {
    pub fn new(fetcher: Arc<dyn TrackFetcher>) -> Self {
        Self {
            fetcher,
            buffers: DashMap::new(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Decoded buffer for `track`, fetching and decoding on first use
    pub async fn resolve(&self, track: &Track) -> Result<SharedBuffer, LoadError> {
        let cached = self.buffers.get(&track.id).map(|b| b.value().clone());
        if let Some(buffer) = cached {
            return Ok(buffer);
        }

        let track_id = track.id;
        let locator = track.source_locator().to_string();

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let data = self
            .fetcher
            .fetch(&locator)
            .await
            .map_err(|failure| match failure {
                FetchFailure::Status(status) => LoadError::Fetch { track_id, status },
                FetchFailure::Connect(reason) => LoadError::Connect { track_id, reason },
            })?;

        let decoded = tokio::task::spawn_blocking(move || decode_audio(data, &locator))
            .await
            .map_err(|e| LoadError::Decode {
                track_id,
                reason: format!("decoder task failed: {}", e),
            })?
            .map_err(|e| LoadError::Decode {
                track_id,
                reason: e.to_string(),
            })?;

        tracing::debug!(
            "Decoded track {}: {} frames, {} ch @ {} Hz",
            track_id,
            decoded.frames(),
            decoded.channels(),
            decoded.sample_rate()
        );

        // First writer wins when two resolutions race
        let buffer = self
            .buffers
            .entry(track_id)
            .or_insert_with(|| Arc::new(decoded))
            .value()
            .clone();
        Ok(buffer)
    }

    /// Seed the cache with an already decoded buffer
    pub fn insert(&self, track_id: TrackId, buffer: DecodedBuffer) -> SharedBuffer {
        let buffer = Arc::new(buffer);
        self.buffers.insert(track_id, buffer.clone());
        buffer
    }

    pub fn get(&self, track_id: TrackId) -> Option<SharedBuffer> {
        self.buffers.get(&track_id).map(|b| b.value().clone())
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.buffers.contains_key(&track_id)
    }

    /// Drop one entry so the next resolve fetches again
    pub fn invalidate(&self, track_id: TrackId) -> bool {
        self.buffers.remove(&track_id).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.buffers.clear();
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of fetches issued so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}
