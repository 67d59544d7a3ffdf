//! Take loading: fetch from storage, decode, memoize

pub mod cache;
pub mod fetch;

pub use cache::BufferCache;
pub use fetch::{FetchFailure, FileFetcher, MemoryFetcher, TrackFetcher};

#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
