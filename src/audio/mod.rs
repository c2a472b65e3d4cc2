//! Audio normalization: sample-format conversion, resampling and WAV decoding.

pub mod resample;
pub mod wav;

pub use resample::{pcm16_bytes_to_f32, pcm16_to_f32, resample, resampled_len, to_target_rate};
pub use wav::{WavAudio, read_wav, read_wav_file};
