//! Whole-buffer resampling.
//!
//! Decoded clips are converted to the output device rate once, right after
//! decode, so the output callback only ever copies frames.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::backend::DecodedBuffer;

/// Resample `buffer` to `dst_rate`, processing `chunk_frames` input frames per call.
///
/// Returns the input unchanged when the rates already match.
pub fn resample_buffer(
    buffer: DecodedBuffer,
    dst_rate: u32,
    chunk_frames: usize,
) -> Result<DecodedBuffer> {
    let src_rate = buffer.sample_rate();
    if src_rate == dst_rate {
        return Ok(buffer);
    }
    if src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!("cannot resample {src_rate} Hz -> {dst_rate} Hz"));
    }

    let channels = buffer.channels();
    let f_ratio = dst_rate as f64 / src_rate as f64;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let chunk_in_frames = chunk_frames.max(1);
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init error: {e}"))?;

    let out_capacity_frames = output_capacity_frames(chunk_in_frames, f_ratio);
    let mut out_interleaved = vec![0.0f32; channels * out_capacity_frames];
    let expected_frames = (buffer.frames() as f64 * f_ratio).ceil() as usize;
    let delay_frames = resampler.output_delay();
    let mut resampled: Vec<f32> =
        Vec::with_capacity((expected_frames + delay_frames + out_capacity_frames) * channels);

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let chunk_samples = chunk_in_frames * channels;
    for chunk in buffer.samples().chunks(chunk_samples) {
        let frames = chunk.len() / channels;
        indexing.partial_len = (frames < chunk_in_frames).then_some(frames);

        let input_adapter = InterleavedSlice::new(chunk, channels, frames)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process error: {e}"))?;

        resampled.extend_from_slice(&out_interleaved[..nbr_out * channels]);
    }

    // Pump silence until the delayed tail has been emitted.
    let silence = vec![0.0f32; chunk_samples];
    indexing.partial_len = Some(0);
    while resampled.len() / channels < delay_frames + expected_frames {
        let input_adapter = InterleavedSlice::new(&silence, channels, chunk_in_frames)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler flush error: {e}"))?;
        if nbr_out == 0 {
            break;
        }
        resampled.extend_from_slice(&out_interleaved[..nbr_out * channels]);
    }

    // Drop the leading delay so frame 0 lines up with the source's frame 0.
    resampled.drain(..(delay_frames * channels).min(resampled.len()));
    resampled.truncate(expected_frames * channels);

    tracing::debug!(
        from_hz = src_rate,
        to_hz = dst_rate,
        frames_in = buffer.frames(),
        frames_out = resampled.len() / channels,
        delay_frames,
        "buffer resampled"
    );
    Ok(DecodedBuffer::new(dst_rate, channels, resampled))
}

/// Output scratch size for one chunk, with headroom for the relative ratio slack.
fn output_capacity_frames(chunk_in_frames: usize, f_ratio: f64) -> usize {
    (chunk_in_frames as f64 * f_ratio * 1.2).ceil() as usize + 64
}
