//! A unit of recognition work.

use crate::defaults::TARGET_SAMPLE_RATE;
use crate::sink::CallerHandle;
use std::fmt;

/// One admitted job: audio already at the engine rate plus the routing data
/// needed to hand the result back.
pub struct RecognitionRequest {
    /// Caller the result is delivered to.
    pub caller: CallerHandle,
    /// Caller-chosen id, returned unchanged with the result.
    pub job_id: i32,
    /// Opaque caller flag, returned unchanged with the result.
    pub flag: u8,
    /// Mono `f32` samples at [`TARGET_SAMPLE_RATE`].
    pub pcm: Vec<f32>,
}

impl RecognitionRequest {
    pub fn new(caller: CallerHandle, job_id: i32, flag: u8, pcm: Vec<f32>) -> Self {
        Self {
            caller,
            job_id,
            flag,
            pcm,
        }
    }

    /// Audio duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.pcm.len() as u64 * 1000 / TARGET_SAMPLE_RATE as u64
    }
}

impl fmt::Debug for RecognitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionRequest")
            .field("caller", &self.caller.name())
            .field("job_id", &self.job_id)
            .field("flag", &self.flag)
            .field("samples", &self.pcm.len())
            .finish()
    }
}
