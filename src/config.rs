use crate::defaults;
use crate::error::{Result, VoxError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub queue: QueueConfig,
}

/// Speech engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Model loaded automatically at startup when the file exists.
    pub model_path: PathBuf,
    /// "auto" or a two-letter language code.
    pub language: String,
    pub threads: usize,
    pub translate: bool,
    pub token_timestamps: bool,
    pub suppress_blank: bool,
    pub suppress_non_speech: bool,
    pub temperature_inc: f32,
    pub entropy_threshold: f32,
}

/// Request queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Seconds within which a token replaces the previous word.
    pub merge_tolerance_secs: f32,
    /// Engine sample rate. Fixed by the engine, only validated.
    pub target_sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(defaults::DEFAULT_MODEL_PATH),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: defaults::DEFAULT_THREADS,
            translate: false,
            token_timestamps: true,
            suppress_blank: true,
            suppress_non_speech: true,
            temperature_inc: defaults::TEMPERATURE_INC,
            entropy_threshold: defaults::ENTROPY_THRESHOLD,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            merge_tolerance_secs: defaults::WORD_MERGE_TOLERANCE_SECS,
            target_sample_rate: defaults::TARGET_SAMPLE_RATE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXQUEUE_MODEL → engine.model_path
    /// - VOXQUEUE_LANGUAGE → engine.language
    /// - VOXQUEUE_THREADS → engine.threads (ignored unless a positive integer)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXQUEUE_MODEL")
            && !model.is_empty()
        {
            self.engine.model_path = PathBuf::from(model);
        }

        if let Ok(language) = std::env::var("VOXQUEUE_LANGUAGE")
            && !language.is_empty()
        {
            self.engine.language = language;
        }

        if let Ok(threads) = std::env::var("VOXQUEUE_THREADS")
            && let Ok(threads) = threads.trim().parse::<usize>()
            && threads > 0
        {
            self.engine.threads = threads;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxqueue/config.toml on Linux, or a path relative
    /// to the working directory when no config directory is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxqueue")
            .join("config.toml")
    }

    /// Reject values the recognizer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.threads == 0 {
            return Err(VoxError::ConfigInvalidValue {
                key: "engine.threads".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if crate::language::resolve_language(&self.engine.language).is_none() {
            return Err(VoxError::ConfigInvalidValue {
                key: "engine.language".to_string(),
                message: format!("unknown language '{}'", self.engine.language),
            });
        }
        if !self.queue.merge_tolerance_secs.is_finite() || self.queue.merge_tolerance_secs < 0.0 {
            return Err(VoxError::ConfigInvalidValue {
                key: "queue.merge_tolerance_secs".to_string(),
                message: "must be a non-negative number".to_string(),
            });
        }
        if self.queue.target_sample_rate != defaults::TARGET_SAMPLE_RATE {
            return Err(VoxError::ConfigInvalidValue {
                key: "queue.target_sample_rate".to_string(),
                message: format!("the engine requires {} Hz", defaults::TARGET_SAMPLE_RATE),
            });
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
