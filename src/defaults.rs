//! Default configuration constants for voxqueue.
//!
//! Shared between the config layer, the recognizer and the engine binding so
//! the values cannot drift apart.

/// Sample rate the speech engine requires, in Hz.
///
/// Every submission is resampled to this rate before it is admitted.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Divisor converting signed 16-bit PCM to `f32` in `[-1.0, 1.0]`.
pub const PCM16_SCALE: f32 = 32768.0;

/// Default language code. "auto" lets the engine detect the spoken language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default number of inference threads.
pub const DEFAULT_THREADS: usize = 1;

/// Default model location, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "models/ggml-tiny.bin";

/// Two words whose start and end both lie within this many seconds of the
/// previous word are treated as a revision of that word.
pub const WORD_MERGE_TOLERANCE_SECS: f32 = 0.05;

/// Model buffers shorter than this are rejected before reaching the engine.
pub const MIN_MODEL_BUFFER_BYTES: usize = 100;

/// Engine timestamps are expressed in ticks of this many milliseconds.
pub const ENGINE_TICK_MS: i64 = 10;

/// Temperature increment used by the engine's fallback decoding.
pub const TEMPERATURE_INC: f32 = 0.4;

/// Entropy threshold used by the engine's fallback decoding.
pub const ENTROPY_THRESHOLD: f32 = 2.4;

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// If no GPU backend is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}
