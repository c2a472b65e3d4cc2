//! Job dispatcher: the single worker that runs queued jobs against the engine.
//!
//! The worker is started on demand when an enqueue finds the dispatcher idle
//! and exits once the queue drains. The engine slot stays locked for the
//! whole inference call, so a model reload waits for the active job instead
//! of racing it.

use crate::engine::{InferenceEngine, InferenceParams, InferenceStatus};
use crate::error::{Result, VoxError};
use crate::recognizer::assembler::Assembler;
use crate::recognizer::cancel::CancellationFlag;
use crate::recognizer::delivery::{self, Delivery};
use crate::recognizer::queue::RequestQueue;
use crate::recognizer::request::RecognitionRequest;
use crate::sink::{DropReason, RecognitionResult};
use crossbeam_channel::Sender;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Owner of the single engine context.
#[derive(Default)]
pub(crate) struct EngineSlot {
    engine: Mutex<Option<Box<dyn InferenceEngine>>>,
    ready: AtomicBool,
    model_name: Mutex<Option<String>>,
}

pub(crate) type EngineGuard<'a> = MutexGuard<'a, Option<Box<dyn InferenceEngine>>>;

impl EngineSlot {
    /// Lock the engine. Blocks while a job is running.
    pub(crate) fn lock(&self) -> EngineGuard<'_> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install `engine` into a locked slot and mark it ready.
    pub(crate) fn install(&self, guard: &mut EngineGuard<'_>, engine: Box<dyn InferenceEngine>) {
        let name = engine.model_name().to_string();
        **guard = Some(engine);
        *self.model_name.lock().unwrap_or_else(|e| e.into_inner()) = Some(name);
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Drop the engine held by a locked slot. Returns `true` if one was loaded.
    pub(crate) fn release(&self, guard: &mut EngineGuard<'_>) -> bool {
        self.ready.store(false, Ordering::SeqCst);
        *self.model_name.lock().unwrap_or_else(|e| e.into_inner()) = None;
        guard.take().is_some()
    }

    /// Never blocks, even while a job holds the engine.
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn model_name(&self) -> Option<String> {
        self.model_name
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl fmt::Debug for EngineSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSlot")
            .field("ready", &self.is_ready())
            .field("model_name", &self.model_name())
            .finish()
    }
}

/// How a job left the `Running` state.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(RecognitionResult),
    Aborted,
    Failed(DropReason),
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed(_) => "completed",
            JobOutcome::Aborted => "aborted",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// State shared between the dispatcher handle and its worker thread.
struct WorkerContext {
    queue: Arc<RequestQueue>,
    cancel: CancellationFlag,
    slot: Arc<EngineSlot>,
    params: Arc<Mutex<InferenceParams>>,
    merge_tolerance: f32,
    delivery: Sender<Delivery>,
}

/// Marks the dispatcher idle if the worker unwinds, so the queue is not
/// left claimed by a dead thread.
struct DispatchGuard<'a>(&'a RequestQueue);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.release_dispatch();
        }
    }
}

impl WorkerContext {
    fn run(&self) {
        let _guard = DispatchGuard(&self.queue);
        while let Some(request) = self.queue.dequeue_active() {
            debug!(
                job_id = request.job_id,
                flag = request.flag,
                duration_ms = request.duration_ms(),
                "Job running"
            );
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_job(&request)))
                .unwrap_or_else(|payload| {
                    JobOutcome::Failed(DropReason::InferenceFailed(format!(
                        "engine panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            debug!(
                job_id = request.job_id,
                outcome = outcome.label(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            );
            self.finish(request, outcome);
        }
        debug!("Queue drained, dispatcher idle");
    }

    fn run_job(&self, request: &RecognitionRequest) -> JobOutcome {
        let params = self
            .params
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut slot = self.slot.lock();
        let Some(engine) = slot.as_mut() else {
            return JobOutcome::Failed(DropReason::ModelNotLoaded);
        };

        // A fresh assembler is the per-job transcript reset
        let mut assembler = Assembler::new(self.cancel.clone(), self.merge_tolerance);
        let status = engine.run(&request.pcm, &params, &mut assembler);
        drop(slot);

        match status {
            Ok(InferenceStatus::Completed) if !self.cancel.is_raised() => {
                match assembler.into_transcript() {
                    Some(transcript) => JobOutcome::Completed(RecognitionResult {
                        job_id: request.job_id,
                        flag: request.flag,
                        text: transcript.recognized_string,
                        words: transcript.recognized_data.into_entries(),
                    }),
                    None => JobOutcome::Failed(DropReason::InferenceFailed(
                        "engine returned without reporting completion".to_string(),
                    )),
                }
            }
            Ok(_) => JobOutcome::Aborted,
            Err(e) if self.cancel.is_raised() => {
                debug!(job_id = request.job_id, "Engine error after stop request: {}", e);
                JobOutcome::Aborted
            }
            Err(e) => JobOutcome::Failed(DropReason::InferenceFailed(e.to_string())),
        }
    }

    fn finish(&self, request: RecognitionRequest, outcome: JobOutcome) {
        let RecognitionRequest {
            caller,
            job_id,
            flag,
            ..
        } = request;

        match outcome {
            JobOutcome::Completed(result) => {
                debug!(job_id, words = result.words.len(), "Recognized: {}", result.text);
                delivery::post(&self.delivery, Delivery::Result { caller, result });
            }
            JobOutcome::Aborted => {
                debug!(job_id, "Job aborted, no result delivered");
            }
            JobOutcome::Failed(reason) => {
                match &reason {
                    DropReason::ModelNotLoaded => {
                        warn!(job_id, "Speech model is not loaded, job dropped")
                    }
                    _ => error!(job_id, "{}", reason),
                }
                delivery::post(
                    &self.delivery,
                    Delivery::Dropped {
                        caller,
                        job_id,
                        flag,
                        reason,
                    },
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Handle to the dispatcher worker.
pub struct Dispatcher {
    context: Arc<WorkerContext>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: Arc<RequestQueue>,
        cancel: CancellationFlag,
        slot: Arc<EngineSlot>,
        params: Arc<Mutex<InferenceParams>>,
        merge_tolerance: f32,
        delivery: Sender<Delivery>,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                queue,
                cancel,
                slot,
                params,
                merge_tolerance,
                delivery,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the worker. Only call after the queue reported the dispatcher
    /// idle, otherwise two workers could pop jobs concurrently.
    pub(crate) fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());

        // The previous worker already gave up the queue and is only exiting
        if let Some(previous) = worker.take()
            && previous.join().is_err()
        {
            warn!("Previous dispatcher worker panicked");
        }

        let context = self.context.clone();
        match thread::Builder::new()
            .name("voxqueue-dispatch".to_string())
            .spawn(move || context.run())
        {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.context.queue.release_dispatch();
                Err(VoxError::Io(e))
            }
        }
    }

    /// Wait for the current worker, if any, to exit.
    pub(crate) fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Dispatcher worker panicked");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("dispatching", &self.context.queue.is_dispatching())
            .field("pending", &self.context.queue.len())
            .field("slot", &self.context.slot)
            .finish()
    }
}
