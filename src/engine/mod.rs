//! Narrow boundary to the external speech inference engine.
//!
//! The engine is a black box that takes 16 kHz mono `f32` audio and reports
//! its progress through [`InferenceCallbacks`] while a blocking
//! [`InferenceEngine::run`] call is in flight. Model loading goes through an
//! [`EngineLoader`] so the recognizer never depends on a concrete engine.

pub mod scripted;
pub mod whisper;

use crate::config::EngineConfig;
use crate::defaults;
use crate::error::Result;
use crate::recognizer::cancel::CancellationFlag;
use std::path::Path;

/// One token as reported by the engine. Times are engine ticks (10 ms).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineToken {
    pub text: String,
    pub t0: i64,
    pub t1: i64,
}

impl EngineToken {
    pub fn new(text: impl Into<String>, t0: i64, t1: i64) -> Self {
        Self {
            text: text.into(),
            t0,
            t1,
        }
    }
}

/// A finalized segment of recognized speech.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSegment {
    pub text: String,
    pub t0: i64,
    pub t1: i64,
    pub tokens: Vec<EngineToken>,
}

impl EngineSegment {
    /// Build a segment whose time range spans its tokens.
    pub fn from_tokens(text: impl Into<String>, tokens: Vec<EngineToken>) -> Self {
        let t0 = tokens.first().map(|t| t.t0).unwrap_or(0);
        let t1 = tokens.last().map(|t| t.t1).unwrap_or(t0);
        Self {
            text: text.into(),
            t0,
            t1,
            tokens,
        }
    }
}

/// How an inference call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStatus {
    /// The engine processed the whole buffer.
    Completed,
    /// The engine stopped early because a callback requested an abort.
    Aborted,
}

/// Parameters fixed for one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
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

impl InferenceParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            language: config.language.clone(),
            threads: config.threads,
            translate: config.translate,
            token_timestamps: config.token_timestamps,
            suppress_blank: config.suppress_blank,
            suppress_non_speech: config.suppress_non_speech,
            temperature_inc: config.temperature_inc,
            entropy_threshold: config.entropy_threshold,
        }
    }

    /// Language to pass to the engine, `None` for automatic detection.
    pub fn language_hint(&self) -> Option<&str> {
        if self.language.is_empty() || self.language == defaults::AUTO_LANGUAGE {
            None
        } else {
            Some(&self.language)
        }
    }
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Hooks the engine raises while [`InferenceEngine::run`] is executing.
///
/// All hooks run on the thread that called `run`.
pub trait InferenceCallbacks {
    /// Called before each encoder pass. Return `false` to abort.
    fn on_encoder_begin(&mut self) -> bool;

    /// `segments` holds every segment finalized so far; the last `new_count`
    /// of them are new since the previous call.
    fn on_new_segment(&mut self, segments: &[EngineSegment], new_count: usize);

    /// Progress in percent. Exactly one `on_progress(100)` ends a completed run.
    fn on_progress(&mut self, percent: i32);

    /// Polled between low-level compute steps. Return `true` to abort.
    fn on_abort_check(&self) -> bool;

    /// Flag backing [`on_abort_check`](Self::on_abort_check), for engines
    /// that need an owned, `'static` abort probe.
    fn abort_handle(&self) -> CancellationFlag;
}

/// A loaded model. Exactly one exists per recognizer at a time, and `run`
/// takes `&mut self` so only one job can ever touch it.
pub trait InferenceEngine: Send {
    /// Run inference over `pcm` (16 kHz mono), blocking until the engine
    /// finishes or a callback aborts it.
    fn run(
        &mut self,
        pcm: &[f32],
        params: &InferenceParams,
        callbacks: &mut dyn InferenceCallbacks,
    ) -> Result<InferenceStatus>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;
}

/// Factory for engine contexts.
pub trait EngineLoader: Send + Sync {
    /// Human-readable engine name, e.g. "whisper.cpp".
    fn name(&self) -> &str;

    /// Load a model from a file on disk.
    fn load_from_file(&self, path: &Path) -> Result<Box<dyn InferenceEngine>>;

    /// Load a model from an in-memory buffer.
    fn load_from_buffer(&self, bytes: &[u8]) -> Result<Box<dyn InferenceEngine>>;
}

/// Derive a model name from its file stem.
pub(crate) fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn segment_time_range_spans_tokens() {
        let segment = EngineSegment::from_tokens(
            " Hello world",
            vec![EngineToken::new("Hello", 10, 40), EngineToken::new("world", 45, 90)],
        );
        assert_eq!(segment.t0, 10);
        assert_eq!(segment.t1, 90);
    }

    #[test]
    fn segment_without_tokens_has_empty_range() {
        let segment = EngineSegment::from_tokens("", vec![]);
        assert_eq!((segment.t0, segment.t1), (0, 0));
    }

    #[test]
    fn auto_language_has_no_hint() {
        let params = InferenceParams::default();
        assert_eq!(params.language, "auto");
        assert_eq!(params.language_hint(), None);
    }

    #[test]
    fn explicit_language_is_passed_through() {
        let params = InferenceParams {
            language: "de".to_string(),
            ..InferenceParams::default()
        };
        assert_eq!(params.language_hint(), Some("de"));
    }

    #[test]
    fn default_params_use_single_thread_greedy_settings() {
        let params = InferenceParams::default();
        assert_eq!(params.threads, 1);
        assert!(!params.translate);
        assert!(params.token_timestamps);
        assert!(params.suppress_blank);
        assert!(params.suppress_non_speech);
        assert_eq!(params.temperature_inc, 0.4);
        assert_eq!(params.entropy_threshold, 2.4);
    }

    #[test]
    fn model_name_uses_file_stem() {
        assert_eq!(
            model_name_from_path(&PathBuf::from("/models/ggml-tiny.bin")),
            "ggml-tiny"
        );
        assert_eq!(model_name_from_path(&PathBuf::from("/")), "unknown");
    }

    #[test]
    fn engine_traits_are_object_safe() {
        fn _assert_engine(_: &dyn InferenceEngine) {}
        fn _assert_loader(_: &dyn EngineLoader) {}
        fn _assert_callbacks(_: &dyn InferenceCallbacks) {}
    }
}
