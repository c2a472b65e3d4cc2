//! WAV file decoding for file submissions.

use crate::defaults::PCM16_SCALE;
use crate::error::{Result, VoxError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Mono audio decoded from a WAV file, still at its original sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavAudio {
    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Decode WAV data from any reader.
///
/// Accepts 16-bit integer and 32-bit float samples with any channel count.
/// Multi-channel audio is averaged down to mono.
pub fn read_wav<R: Read>(reader: R) -> Result<WavAudio> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VoxError::AudioRead {
        message: format!("Failed to parse WAV file: {}", e),
    })?;

    let spec = wav_reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => wav_reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / PCM16_SCALE))
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (hound::SampleFormat::Float, 32) => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (format, bits) => {
            return Err(VoxError::AudioRead {
                message: format!("Unsupported WAV sample format: {:?} {}-bit", format, bits),
            });
        }
    }
    .map_err(|e| VoxError::AudioRead {
        message: format!("Failed to read WAV samples: {}", e),
    })?;

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(WavAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode a WAV file from disk.
pub fn read_wav_file(path: &Path) -> Result<WavAudio> {
    let file = File::open(path).map_err(|e| VoxError::AudioRead {
        message: format!("Failed to open {}: {}", path.display(), e),
    })?;
    read_wav(BufReader::new(file))
}
