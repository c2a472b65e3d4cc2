//! Error types for voxqueue.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Audio admission errors
    #[error("Invalid sample rate: {rate}")]
    InvalidSampleRate { rate: u32 },

    #[error("Audio buffer is empty")]
    EmptyAudio,

    #[error("Failed to resample audio from {from} Hz to {to} Hz")]
    ResampleFailed { from: u32, to: u32 },

    #[error("Failed to read audio: {message}")]
    AudioRead { message: String },

    #[error("Audio rejected: {message}")]
    AudioRejected { message: String },

    // Engine errors
    #[error("Speech model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Invalid speech model: {message}")]
    InvalidModel { message: String },

    #[error("Speech model is not loaded")]
    ModelNotLoaded,

    #[error("Inference failed: {message}")]
    InferenceFailed { message: String },

    #[error("Recognition was aborted")]
    Aborted,

    #[error("Recognizer is shutting down")]
    ShuttingDown,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VoxError>;
