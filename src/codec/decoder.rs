//! Symphonia-based decoder for fetched takes

use std::io::Cursor;

use bytes::Bytes;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::buffer::DecodedBuffer;
use crate::error::CodecError;

/// Decode a complete encoded file held in memory
///
/// `locator` is only used as a format hint (its extension). Corrupt packets
/// inside an otherwise valid stream are skipped.
pub fn decode_audio(data: Bytes, locator: &str) -> Result<DecodedBuffer, CodecError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension(locator) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| CodecError::Probe(e.to_string()))?;

    let mut format = probed.format;

    let track = format.default_track().ok_or(CodecError::NoTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(CodecError::DecodingFailed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let needed = decoded.capacity() as u64;
                let too_small = sample_buf
                    .as_ref()
                    .map_or(true, |buf| (buf.capacity() as u64) < needed * channels as u64);
                if too_small {
                    sample_buf = Some(SampleBuffer::new(needed, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(CodecError::DecodingFailed(e.to_string())),
        }
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(CodecError::Empty);
    }

    Ok(DecodedBuffer::new(samples, channels, sample_rate))
}

fn extension(locator: &str) -> Option<&str> {
    let name = locator.rsplit('/').next()?;
    let name = name.split(['?', '#']).next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit PCM WAV of a constant level, for fixtures
    pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, frames: usize, level: f32) -> Bytes {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let value = (level * i16::MAX as f32) as i16;
            for _ in 0..frames * channels as usize {
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        Bytes::from(cursor.into_inner())
    }

    #[test]
    fn test_decode_wav() {
        let data = wav_bytes(2, 44_100, 4410, 0.5);
        let buffer = decode_audio(data, "tracks/take.wav").unwrap();

        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.sample_rate(), 44_100);
        assert_eq!(buffer.frames(), 4410);
        assert!((buffer.sample(100, 1) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_without_hint() {
        let data = wav_bytes(1, 48_000, 480, 0.25);
        let buffer = decode_audio(data, "storage/blob").unwrap();
        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.frames(), 480);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let data = Bytes::from_static(b"definitely not an audio file at all");
        let result = decode_audio(data, "take.wav");
        assert!(result.is_err());
    }

    #[test]
    fn test_extension_parsing() {
        assert_eq!(extension("a/b/take.wav"), Some("wav"));
        assert_eq!(extension("take.mp3?sig=abc"), Some("mp3"));
        assert_eq!(extension("a.dir/noext"), None);
    }
}
