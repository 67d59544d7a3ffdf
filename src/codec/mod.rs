//! Audio decoding
//!
//! Turns the encoded bytes of a take into a `DecodedBuffer` using symphonia.

pub mod decoder;

pub use decoder::decode_audio;
