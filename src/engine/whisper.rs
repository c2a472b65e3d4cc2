//! whisper.cpp engine binding.
//!
//! # Feature Gate
//!
//! The real binding requires the `whisper` feature and cmake:
//!
//! ```bash
//! cargo build --features whisper
//! ```
//!
//! Without the feature, [`WhisperLoader`] still exists but every load fails
//! with an explanatory error.

use crate::engine::{EngineLoader, InferenceEngine};
use crate::error::{Result, VoxError};
use std::path::Path;

#[cfg(feature = "whisper")]
use crate::engine::{
    EngineSegment, EngineToken, InferenceCallbacks, InferenceParams, InferenceStatus,
    model_name_from_path,
};
#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use tracing::{debug, info};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
    install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Loads whisper.cpp (ggml) models.
#[derive(Debug, Default, Clone)]
pub struct WhisperLoader {
    /// Use the GPU backend compiled into whisper.cpp, if any.
    pub use_gpu: bool,
}

impl WhisperLoader {
    pub fn new() -> Self {
        Self {
            use_gpu: crate::defaults::gpu_backend() != "CPU",
        }
    }
}

#[cfg(feature = "whisper")]
impl WhisperLoader {
    fn context_params(&self) -> WhisperContextParameters<'static> {
        // Suppress whisper.cpp's own stderr output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        let mut params = WhisperContextParameters::default();
        params.use_gpu(self.use_gpu);
        params
    }
}

#[cfg(feature = "whisper")]
impl EngineLoader for WhisperLoader {
    fn name(&self) -> &str {
        "whisper.cpp"
    }

    fn load_from_file(&self, path: &Path) -> Result<Box<dyn InferenceEngine>> {
        if !path.exists() {
            return Err(VoxError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let path_str = path.to_str().ok_or_else(|| VoxError::InvalidModel {
            message: "Invalid UTF-8 in model path".to_string(),
        })?;

        info!(path = %path.display(), gpu = self.use_gpu, "Loading Whisper model");
        let context = WhisperContext::new_with_params(path_str, self.context_params()).map_err(
            |e| VoxError::InvalidModel {
                message: format!("Failed to load Whisper model: {}", e),
            },
        )?;

        Ok(Box::new(WhisperEngine {
            context,
            model_name: model_name_from_path(path),
        }))
    }

    fn load_from_buffer(&self, bytes: &[u8]) -> Result<Box<dyn InferenceEngine>> {
        info!(bytes = bytes.len(), gpu = self.use_gpu, "Loading Whisper model from memory");
        let context = WhisperContext::new_from_buffer_with_params(bytes, self.context_params())
            .map_err(|e| VoxError::InvalidModel {
                message: format!("Failed to load Whisper model from buffer: {}", e),
            })?;

        Ok(Box::new(WhisperEngine {
            context,
            model_name: "in-memory".to_string(),
        }))
    }
}

#[cfg(not(feature = "whisper"))]
const NOT_ENABLED: &str = concat!(
    "Whisper feature not enabled. This binary was built without speech recognition.\n",
    "To fix: cargo build --release --features whisper\n",
    "If build fails with cmake errors, install: sudo apt install cmake"
);

#[cfg(not(feature = "whisper"))]
impl EngineLoader for WhisperLoader {
    fn name(&self) -> &str {
        "whisper.cpp (disabled)"
    }

    fn load_from_file(&self, path: &Path) -> Result<Box<dyn InferenceEngine>> {
        if !path.exists() {
            return Err(VoxError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        Err(VoxError::InvalidModel {
            message: NOT_ENABLED.to_string(),
        })
    }

    fn load_from_buffer(&self, _bytes: &[u8]) -> Result<Box<dyn InferenceEngine>> {
        Err(VoxError::InvalidModel {
            message: NOT_ENABLED.to_string(),
        })
    }
}

/// A loaded whisper.cpp context.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: WhisperContext,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    fn full_params<'a>(
        params: &'a InferenceParams,
        callbacks: &dyn InferenceCallbacks,
    ) -> FullParams<'a, 'a> {
        let mut full = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        full.set_language(params.language_hint());
        full.set_n_threads(params.threads.max(1) as i32);
        full.set_translate(params.translate);
        full.set_token_timestamps(params.token_timestamps);
        full.set_suppress_blank(params.suppress_blank);
        full.set_suppress_nst(params.suppress_non_speech);
        full.set_temperature_inc(params.temperature_inc);
        full.set_entropy_thold(params.entropy_threshold);

        // Disable printing to stdout/stderr
        full.set_print_special(false);
        full.set_print_progress(false);
        full.set_print_realtime(false);
        full.set_print_timestamps(false);

        let abort = callbacks.abort_handle();
        let abort_callback: Box<dyn FnMut() -> bool> = Box::new(move || abort.is_raised());
        full.set_abort_callback_safe::<_, Box<dyn FnMut() -> bool>>(Some(abort_callback));
        full
    }

    fn collect_segments(state: &WhisperState) -> Vec<EngineSegment> {
        state
            .as_iter()
            .map(|segment| {
                let tokens = (0..segment.n_tokens())
                    .filter_map(|i| segment.get_token(i))
                    .map(|token| {
                        let data = token.token_data();
                        let text = token
                            .to_str_lossy()
                            .map(|t| t.into_owned())
                            .unwrap_or_default();
                        EngineToken::new(text, data.t0, data.t1)
                    })
                    .collect();
                EngineSegment {
                    text: segment.to_string(),
                    t0: segment.start_timestamp(),
                    t1: segment.end_timestamp(),
                    tokens,
                }
            })
            .collect()
    }
}

#[cfg(feature = "whisper")]
impl InferenceEngine for WhisperEngine {
    fn run(
        &mut self,
        pcm: &[f32],
        params: &InferenceParams,
        callbacks: &mut dyn InferenceCallbacks,
    ) -> Result<InferenceStatus> {
        // The safe whisper-rs API has no per-pass encoder hook, so this runs
        // once per job. Aborts inside `full` go through the abort callback.
        if !callbacks.on_encoder_begin() {
            return Ok(InferenceStatus::Aborted);
        }

        let mut state = self
            .context
            .create_state()
            .map_err(|e| VoxError::InferenceFailed {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let full = Self::full_params(params, callbacks);
        if let Err(e) = state.full(full, pcm) {
            if callbacks.on_abort_check() {
                debug!("Whisper inference aborted: {}", e);
                return Ok(InferenceStatus::Aborted);
            }
            return Err(VoxError::InferenceFailed {
                message: format!("Whisper inference failed: {}", e),
            });
        }
        if callbacks.on_abort_check() {
            return Ok(InferenceStatus::Aborted);
        }

        let segments = Self::collect_segments(&state);
        let total = segments.len();
        for i in 0..total {
            callbacks.on_new_segment(&segments[..=i], 1);
            callbacks.on_progress((((i + 1) * 100 / total) as i32).min(99));
        }
        callbacks.on_progress(100);
        Ok(InferenceStatus::Completed)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
