//! Deterministic in-process engine.
//!
//! Replays scripted segments through the same callback sequence a real
//! engine produces. Used by the test suite and for exercising callers
//! without a model on disk.

use crate::engine::{
    EngineLoader, EngineSegment, EngineToken, InferenceCallbacks, InferenceEngine,
    InferenceParams, InferenceStatus, model_name_from_path,
};
use crate::error::{Result, VoxError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

type Responder = Arc<dyn Fn(&[f32]) -> Vec<EngineSegment> + Send + Sync>;

/// Build one segment from whitespace-separated words, giving each word a
/// 30-tick slot starting at `start_tick`.
pub fn segment_from_words(text: &str, start_tick: i64) -> EngineSegment {
    let tokens = text
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let t0 = start_tick + i as i64 * 30;
            EngineToken::new(format!(" {}", word), t0, t0 + 25)
        })
        .collect();
    EngineSegment::from_tokens(format!(" {}", text), tokens)
}

#[derive(Debug, Default)]
struct ProbeState {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    languages: Mutex<Vec<String>>,
}

/// Counts engine invocations, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct InvocationProbe {
    state: Arc<ProbeState>,
}

impl InvocationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self, params: &InferenceParams) -> ActiveCall<'_> {
        let now = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(now, Ordering::SeqCst);
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .languages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(params.language.clone());
        ActiveCall(self)
    }

    /// Calls currently inside `run`.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls ever observed.
    pub fn max_concurrent(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Total calls so far.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Language parameter of every call, in call order.
    pub fn languages(&self) -> Vec<String> {
        self.state
            .languages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

struct ActiveCall<'a>(&'a InvocationProbe);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine that replays a script.
pub struct ScriptedEngine {
    name: String,
    responder: Responder,
    failure: Option<String>,
    gate: Option<Receiver<()>>,
    started: Option<Sender<usize>>,
    delay: Duration,
    probe: InvocationProbe,
}

impl ScriptedEngine {
    /// Engine that emits `segments` for every job.
    pub fn new(segments: Vec<EngineSegment>) -> Self {
        Self::with_responder(move |_| segments.clone())
    }

    /// Engine that derives its segments from the submitted audio.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&[f32]) -> Vec<EngineSegment> + Send + Sync + 'static,
    {
        Self {
            name: "scripted".to_string(),
            responder: Arc::new(responder),
            failure: None,
            gate: None,
            started: None,
            delay: Duration::ZERO,
            probe: InvocationProbe::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Fail every run with `message` after the encoder pass.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Block each run until a message arrives on `gate` (or it disconnects),
    /// checking for aborts while waiting.
    pub fn with_gate(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Send the sample count of each job as it enters `run`.
    pub fn with_start_signal(mut self, started: Sender<usize>) -> Self {
        self.started = Some(started);
        self
    }

    /// Spend `delay` inside each run, checking for aborts while waiting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_probe(mut self, probe: InvocationProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn probe(&self) -> InvocationProbe {
        self.probe.clone()
    }

    fn wait_for_gate(&self, callbacks: &dyn InferenceCallbacks) -> bool {
        let Some(gate) = &self.gate else {
            return true;
        };
        loop {
            if callbacks.on_abort_check() {
                return false;
            }
            match gate.recv_timeout(POLL_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return true,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }
    }

    fn wait_for_delay(&self, callbacks: &dyn InferenceCallbacks) -> bool {
        let deadline = Instant::now() + self.delay;
        while Instant::now() < deadline {
            if callbacks.on_abort_check() {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }
}

impl InferenceEngine for ScriptedEngine {
    fn run(
        &mut self,
        pcm: &[f32],
        params: &InferenceParams,
        callbacks: &mut dyn InferenceCallbacks,
    ) -> Result<InferenceStatus> {
        let _call = self.probe.enter(params);

        if let Some(started) = &self.started
            && started.send(pcm.len()).is_err()
        {
            // Nobody is waiting for the start signal
        }

        if !callbacks.on_encoder_begin() {
            return Ok(InferenceStatus::Aborted);
        }
        if !self.wait_for_gate(callbacks) || !self.wait_for_delay(callbacks) {
            return Ok(InferenceStatus::Aborted);
        }
        if let Some(message) = &self.failure {
            return Err(VoxError::InferenceFailed {
                message: message.clone(),
            });
        }

        let segments = (self.responder)(pcm);
        let total = segments.len();
        for i in 0..total {
            if callbacks.on_abort_check() {
                return Ok(InferenceStatus::Aborted);
            }
            callbacks.on_new_segment(&segments[..=i], 1);
            callbacks.on_progress((((i + 1) * 100 / total) as i32).min(99));
        }
        callbacks.on_progress(100);
        Ok(InferenceStatus::Completed)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("name", &self.name)
            .field("failure", &self.failure)
            .field("gated", &self.gate.is_some())
            .field("delay", &self.delay)
            .finish()
    }
}

type Factory = Box<dyn Fn() -> Result<ScriptedEngine> + Send + Sync>;

/// Loader producing [`ScriptedEngine`]s.
pub struct ScriptedLoader {
    factory: Factory,
    loads: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> ScriptedEngine + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(move || Ok(factory())),
            loads: AtomicUsize::new(0),
        }
    }

    /// Loader whose every load fails with `InvalidModel`.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self {
            factory: Box::new(move || {
                Err(VoxError::InvalidModel {
                    message: message.clone(),
                })
            }),
            loads: AtomicUsize::new(0),
        }
    }

    /// Successful loads so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn build(&self) -> Result<ScriptedEngine> {
        let engine = (self.factory)()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(engine)
    }
}

impl EngineLoader for ScriptedLoader {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load_from_file(&self, path: &Path) -> Result<Box<dyn InferenceEngine>> {
        if !path.exists() {
            return Err(VoxError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let name = model_name_from_path(path);
        Ok(Box::new(self.build()?.with_name(&name)))
    }

    fn load_from_buffer(&self, _bytes: &[u8]) -> Result<Box<dyn InferenceEngine>> {
        Ok(Box::new(self.build()?))
    }
}

impl fmt::Debug for ScriptedLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedLoader")
            .field("loads", &self.loads())
            .finish()
    }
}
