//! voxqueue - Single-flight speech recognition queue
//!
//! Turns irregular audio submissions (any sample rate, 16-bit or float, from
//! any thread) into a strictly serialized sequence of jobs against one
//! offline speech engine, and hands back a clean transcript with a
//! time-stamped word list.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod language;
pub mod recognizer;
pub mod sink;

// Service object
pub use recognizer::Recognizer;

// Engine boundary (engine → callbacks → assembler)
pub use engine::scripted::{ScriptedEngine, ScriptedLoader};
pub use engine::whisper::WhisperLoader;
pub use engine::{EngineLoader, InferenceCallbacks, InferenceEngine, InferenceParams};

// Results
pub use recognizer::words::WordEntry;
pub use sink::{
    CallerHandle, ChannelSink, CollectorSink, DropReason, RecognitionResult, ResultSink,
    SinkEvent,
};

// Error handling
pub use error::{Result, VoxError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
