//! Caller-facing result delivery.
//!
//! A [`ResultSink`] is the caller handle attached to every submission. Its
//! hooks are only ever invoked on the recognizer's delivery thread, never on
//! the submitting thread or the inference worker.

use crate::recognizer::words::WordEntry;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Final output of one recognition job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub job_id: i32,
    pub flag: u8,
    pub text: String,
    pub words: Vec<WordEntry>,
}

/// Why a job ended without a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The audio could not be normalized for the engine.
    Admission(String),
    /// No model was loaded when the job reached the engine.
    ModelNotLoaded,
    /// The engine reported a failure.
    InferenceFailed(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Admission(msg) => write!(f, "Admission failed: {}", msg),
            DropReason::ModelNotLoaded => write!(f, "Speech model is not loaded"),
            DropReason::InferenceFailed(msg) => write!(f, "Inference failed: {}", msg),
        }
    }
}

/// Receives results for the jobs a caller submitted.
pub trait ResultSink: Send + Sync + 'static {
    /// A job completed.
    fn on_result(&self, result: RecognitionResult);

    /// A job was dropped before producing a result. Aborted jobs never
    /// reach this hook. Silent by default.
    fn on_dropped(&self, _job_id: i32, _flag: u8, _reason: &DropReason) {}

    /// A model finished loading.
    fn on_model_ready(&self, _model_name: &str) {}

    /// Name for logging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Shared caller handle used to route results back.
pub type CallerHandle = Arc<dyn ResultSink>;

/// Sink that stores everything it receives.
#[derive(Debug, Default)]
pub struct CollectorSink {
    results: Mutex<Vec<RecognitionResult>>,
    dropped: Mutex<Vec<(i32, DropReason)>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results received so far, in delivery order.
    pub fn results(&self) -> Vec<RecognitionResult> {
        self.results
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Dropped job ids with their reasons, in delivery order.
    pub fn dropped(&self) -> Vec<(i32, DropReason)> {
        self.dropped
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl ResultSink for CollectorSink {
    fn on_result(&self, result: RecognitionResult) {
        match self.results.lock() {
            Ok(mut results) => results.push(result),
            Err(e) => e.into_inner().push(result),
        }
    }

    fn on_dropped(&self, job_id: i32, _flag: u8, reason: &DropReason) {
        match self.dropped.lock() {
            Ok(mut dropped) => dropped.push((job_id, reason.clone())),
            Err(e) => e.into_inner().push((job_id, reason.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Event forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Result(RecognitionResult),
    Dropped {
        job_id: i32,
        flag: u8,
        reason: DropReason,
    },
    ModelReady(String),
}

/// Sink that forwards every event into a channel the caller reads from.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver paired with it.
    pub fn channel() -> (Self, Receiver<SinkEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn on_result(&self, result: RecognitionResult) {
        if self.tx.send(SinkEvent::Result(result)).is_err() {
            // Receiver gone - the caller stopped listening
        }
    }

    fn on_dropped(&self, job_id: i32, flag: u8, reason: &DropReason) {
        let event = SinkEvent::Dropped {
            job_id,
            flag,
            reason: reason.clone(),
        };
        if self.tx.send(event).is_err() {
            // Receiver gone - the caller stopped listening
        }
    }

    fn on_model_ready(&self, model_name: &str) {
        if self
            .tx
            .send(SinkEvent::ModelReady(model_name.to_string()))
            .is_err()
        {
            // Receiver gone - the caller stopped listening
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
