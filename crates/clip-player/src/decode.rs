//! Whole-resource decode.
//!
//! Uses Symphonia to:
//! - probe the fetched bytes for container/codec
//! - decode every packet of the default track into interleaved `f32`
//! - hand back a [`DecodedBuffer`] ready for one-shot playback

use std::io::Cursor;

use anyhow::{Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::backend::DecodedBuffer;

/// Decode an in-memory encoded file. `ext_hint` speeds up probing when known.
pub fn decode_bytes(bytes: Vec<u8>, ext_hint: Option<&str>) -> Result<DecodedBuffer> {
    if bytes.is_empty() {
        return Err(anyhow!("empty resource"));
    }
    let byte_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = ext_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::with_capacity(capacity_hint(
        codec_params.n_frames,
        channels,
        byte_len,
    ));
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if skipped_packets > 0 {
        tracing::warn!(skipped_packets, "corrupt packets skipped during decode");
    }
    if samples.is_empty() {
        return Err(anyhow!("no audio decoded"));
    }

    Ok(DecodedBuffer::new(rate, channels, samples))
}

/// Initial sample capacity from the header's frame count.
///
/// The header is untrusted, so the hint never exceeds the encoded size.
fn capacity_hint(n_frames: Option<u64>, channels: usize, byte_len: usize) -> usize {
    n_frames
        .and_then(|f| usize::try_from(f).ok())
        .and_then(|f| f.checked_mul(channels))
        .map_or(0, |samples| samples.min(byte_len))
}

/// Infer a file extension from a URL or path if present.
pub fn infer_ext(resource: &str) -> Option<String> {
    let tail = resource.split(['?', '#']).next().unwrap_or(resource);
    let file = tail.rsplit(['/', '\\']).next().unwrap_or(tail);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() && !ext.is_empty() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal 16-bit PCM WAV.
    fn wav_bytes(rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let block_align = channels * 2;
        let data_len = frames * block_align as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames * channels as u32 {
            let s = ((i % 64) as i16 - 32) * 512;
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_pcm_wav() {
        let buf = decode_bytes(wav_bytes(8_000, 2, 4_000), Some("wav")).unwrap();
        assert_eq!(buf.sample_rate(), 8_000);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 4_000);
        assert!((buf.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn decodes_without_hint() {
        let buf = decode_bytes(wav_bytes(8_000, 1, 800), None).unwrap();
        assert_eq!(buf.frames(), 800);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_bytes(b"definitely not audio".to_vec(), Some("mp3")).is_err());
        assert!(decode_bytes(Vec::new(), None).is_err());
    }

    #[test]
    fn oversized_data_length_does_not_preallocate() {
        // 8-bit mono, header claims ~4 GiB of data but carries 100 bytes.
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36u32 + 100).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8_000u32.to_le_bytes());
        out.extend_from_slice(&8_000u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&0xFFFF_FF00u32.to_le_bytes());
        out.extend(std::iter::repeat_n(0x80u8, 100));

        if let Ok(buf) = decode_bytes(out, Some("wav")) {
            assert!(buf.frames() <= 100);
        }
    }

    #[test]
    fn capacity_hint_is_bounded_by_input() {
        assert_eq!(capacity_hint(Some(0xFFFF_FF00), 2, 144), 144);
        assert_eq!(capacity_hint(Some(u64::MAX), usize::MAX, 10), 0);
        assert_eq!(capacity_hint(Some(50), 2, 1_000), 100);
        assert_eq!(capacity_hint(None, 2, 1_000), 0);
    }

    #[test]
    fn infer_ext_handles_query_and_missing_ext() {
        assert_eq!(
            infer_ext("http://example/a.flac?x=1"),
            Some("flac".to_string())
        );
        assert_eq!(infer_ext("http://example/a"), None);
        assert_eq!(infer_ext("/music/Track.MP3"), Some("mp3".to_string()));
    }

    #[test]
    fn infer_ext_handles_multiple_dots() {
        assert_eq!(
            infer_ext("file:///tmp/archive.track.flac"),
            Some("flac".to_string())
        );
    }
}
