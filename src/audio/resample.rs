//! Sample-format normalization and linear resampling.
//!
//! Every submission is converted to mono `f32` at [`TARGET_SAMPLE_RATE`]
//! before it reaches the request queue.

use crate::defaults::{PCM16_SCALE, TARGET_SAMPLE_RATE};
use crate::error::{Result, VoxError};
use std::borrow::Cow;

/// Convert signed 16-bit samples to `f32` in `[-1.0, 1.0]`.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / PCM16_SCALE)
        .collect()
}

/// Convert little-endian 16-bit PCM bytes to `f32` in `[-1.0, 1.0]`.
///
/// A trailing odd byte is ignored.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect()
}

/// Number of samples produced when resampling `len` samples from `from_rate`
/// to `to_rate`.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }
    (len as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

/// Resample mono audio using linear interpolation.
///
/// Returns the input unchanged when the rates already match. Otherwise the
/// output holds `round(len * to_rate / from_rate)` samples.
///
/// # Errors
/// `InvalidSampleRate` if either rate is zero, `ResampleFailed` if the
/// conversion would produce an empty buffer.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Cow<'_, [f32]>> {
    if from_rate == 0 {
        return Err(VoxError::InvalidSampleRate { rate: from_rate });
    }
    if to_rate == 0 {
        return Err(VoxError::InvalidSampleRate { rate: to_rate });
    }
    if from_rate == to_rate {
        return Ok(Cow::Borrowed(samples));
    }

    let output_len = resampled_len(samples.len(), from_rate, to_rate);
    if output_len == 0 {
        return Err(VoxError::ResampleFailed {
            from: from_rate,
            to: to_rate,
        });
    }

    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;
    let output = (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * step;
            let idx = (source_pos.floor() as usize).min(last);
            let frac = (source_pos - idx as f64).clamp(0.0, 1.0) as f32;
            if idx < last {
                samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
            } else {
                samples[last]
            }
        })
        .collect();

    Ok(Cow::Owned(output))
}

/// Bring an owned buffer to the engine rate, moving it through untouched when
/// no conversion is needed.
pub fn to_target_rate(samples: Vec<f32>, sample_rate: u32) -> Result<Vec<f32>> {
    if sample_rate == TARGET_SAMPLE_RATE {
        return Ok(samples);
    }
    Ok(resample(&samples, sample_rate, TARGET_SAMPLE_RATE)?.into_owned())
}
