//! The recognizer service object.
//!
//! Owns the engine context, the request queue and three threads:
//!
//! - admission: converts and resamples submissions off the caller's thread,
//!   preserving submission order
//! - dispatcher: runs one job at a time against the engine (started on
//!   demand, see [`Dispatcher`])
//! - delivery: invokes [`ResultSink`] hooks
//!
//! [`ResultSink`]: crate::sink::ResultSink

use crate::audio::resample::{pcm16_bytes_to_f32, to_target_rate};
use crate::config::Config;
use crate::defaults::MIN_MODEL_BUFFER_BYTES;
use crate::engine::{EngineLoader, InferenceEngine, InferenceParams};
use crate::error::{Result, VoxError};
use crate::language::resolve_language;
use crate::recognizer::cancel::CancellationFlag;
use crate::recognizer::delivery::{self, Delivery};
use crate::recognizer::dispatcher::{Dispatcher, EngineSlot};
use crate::recognizer::queue::{Enqueued, RequestQueue};
use crate::recognizer::request::RecognitionRequest;
use crate::sink::{CallerHandle, ChannelSink, DropReason, RecognitionResult, SinkEvent};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Audio as submitted, before normalization.
enum RawAudio {
    Pcm16(Vec<u8>),
    Float(Vec<f32>),
}

struct Submission {
    caller: CallerHandle,
    job_id: i32,
    flag: u8,
    audio: RawAudio,
    sample_rate: u32,
    generation: u64,
}

impl Submission {
    /// Take the audio out as mono `f32` at the engine rate.
    fn take_pcm(&mut self) -> Result<Vec<f32>> {
        let samples = match std::mem::replace(&mut self.audio, RawAudio::Float(Vec::new())) {
            RawAudio::Pcm16(bytes) => pcm16_bytes_to_f32(&bytes),
            RawAudio::Float(samples) => samples,
        };
        if samples.is_empty() {
            return Err(VoxError::EmptyAudio);
        }
        to_target_rate(samples, self.sample_rate)
    }
}

/// Admission thread body.
struct Admission {
    queue: Arc<RequestQueue>,
    dispatcher: Arc<Dispatcher>,
    delivery: Sender<Delivery>,
}

impl Admission {
    fn run(self, rx: Receiver<Submission>) {
        for mut submission in rx {
            let pcm = match submission.take_pcm() {
                Ok(pcm) => pcm,
                Err(e) => {
                    warn!(job_id = submission.job_id, "Submission dropped: {}", e);
                    delivery::post(
                        &self.delivery,
                        Delivery::Dropped {
                            caller: submission.caller,
                            job_id: submission.job_id,
                            flag: submission.flag,
                            reason: DropReason::Admission(e.to_string()),
                        },
                    );
                    continue;
                }
            };

            let job_id = submission.job_id;
            let request =
                RecognitionRequest::new(submission.caller, job_id, submission.flag, pcm);
            match self.queue.enqueue_in(submission.generation, request) {
                Enqueued::StartDispatcher => {
                    if let Err(e) = self.dispatcher.start() {
                        error!(job_id, "Failed to start dispatcher: {}", e);
                    }
                }
                Enqueued::Queued => debug!(job_id, "Job queued"),
                Enqueued::Stale => debug!(job_id, "Submission predates a stop, discarded"),
            }
        }
        debug!("Admission thread exiting");
    }
}

/// Speech recognition service: submit audio, receive results.
///
/// One instance owns one engine context. All jobs are serialized against it.
pub struct Recognizer {
    loader: Arc<dyn EngineLoader>,
    queue: Arc<RequestQueue>,
    slot: Arc<EngineSlot>,
    params: Arc<Mutex<InferenceParams>>,
    dispatcher: Arc<Dispatcher>,
    admission_tx: Option<Sender<Submission>>,
    admission_handle: Option<JoinHandle<()>>,
    delivery_tx: Sender<Delivery>,
    delivery_handle: Option<JoinHandle<()>>,
    ready_listener: Mutex<Option<CallerHandle>>,
}

impl Recognizer {
    /// Create a recognizer without a model. Load one with
    /// [`load_from_file`](Self::load_from_file) or
    /// [`load_from_buffer`](Self::load_from_buffer).
    pub fn new(loader: Arc<dyn EngineLoader>, config: &Config) -> Result<Self> {
        config.validate()?;

        let mut params = InferenceParams::from_config(&config.engine);
        if let Some(code) = resolve_language(&params.language) {
            params.language = code;
        }

        let cancel = CancellationFlag::new();
        let queue = Arc::new(RequestQueue::new(cancel.clone()));
        let slot = Arc::new(EngineSlot::default());
        let params = Arc::new(Mutex::new(params));

        let (delivery_tx, delivery_rx) = unbounded();
        let delivery_handle = delivery::spawn(delivery_rx)?;

        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            cancel,
            slot.clone(),
            params.clone(),
            config.queue.merge_tolerance_secs,
            delivery_tx.clone(),
        ));

        let (admission_tx, admission_rx) = unbounded();
        let admission = Admission {
            queue: queue.clone(),
            dispatcher: dispatcher.clone(),
            delivery: delivery_tx.clone(),
        };
        let admission_handle = thread::Builder::new()
            .name("voxqueue-admission".to_string())
            .spawn(move || admission.run(admission_rx))?;

        debug!(engine = loader.name(), "Recognizer started");

        Ok(Self {
            loader,
            queue,
            slot,
            params,
            dispatcher,
            admission_tx: Some(admission_tx),
            admission_handle: Some(admission_handle),
            delivery_tx,
            delivery_handle: Some(delivery_handle),
            ready_listener: Mutex::new(None),
        })
    }

    /// Create a recognizer and load `engine.model_path` if that file exists.
    pub fn from_config(loader: Arc<dyn EngineLoader>, config: &Config) -> Result<Self> {
        let recognizer = Self::new(loader, config)?;
        let model_path = &config.engine.model_path;
        if model_path.exists() {
            recognizer.load_from_file(model_path, false)?;
        } else {
            info!(path = %model_path.display(), "Model file not found, starting without a model");
        }
        Ok(recognizer)
    }

    /// Load a model from disk.
    ///
    /// Returns `Ok(false)` without touching the engine when a model is
    /// already loaded and `force_reinitialize` is false.
    pub fn load_from_file(&self, path: &Path, force_reinitialize: bool) -> Result<bool> {
        if self.skip_load(force_reinitialize) {
            return Ok(false);
        }
        if !path.exists() {
            return Err(VoxError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        self.reload(|loader| loader.load_from_file(path))
    }

    /// Load a model from an in-memory archive.
    pub fn load_from_buffer(&self, bytes: &[u8], force_reinitialize: bool) -> Result<bool> {
        if self.skip_load(force_reinitialize) {
            return Ok(false);
        }
        if bytes.len() < MIN_MODEL_BUFFER_BYTES {
            return Err(VoxError::InvalidModel {
                message: format!("model archive is too small ({} bytes)", bytes.len()),
            });
        }
        self.reload(|loader| loader.load_from_buffer(bytes))
    }

    fn skip_load(&self, force_reinitialize: bool) -> bool {
        if self.is_ready() && !force_reinitialize {
            info!(
                model = self.model_name().as_deref().unwrap_or("unknown"),
                "Model already loaded, skipping"
            );
            return true;
        }
        false
    }

    fn reload<F>(&self, load: F) -> Result<bool>
    where
        F: FnOnce(&dyn EngineLoader) -> Result<Box<dyn InferenceEngine>>,
    {
        self.cancel_everything("model reload");

        // Waits for the active job to return from the engine
        let mut slot = self.slot.lock();
        if self.slot.release(&mut slot) {
            info!("Released previous model");
        }

        let engine = load(self.loader.as_ref())?;
        let model_name = engine.model_name().to_string();
        self.slot.install(&mut slot, engine);
        drop(slot);

        info!(model = %model_name, engine = self.loader.name(), "Model ready");
        if let Some(listener) = self.ready_listener() {
            delivery::post(
                &self.delivery_tx,
                Delivery::ModelReady {
                    caller: listener,
                    model_name,
                },
            );
        }
        Ok(true)
    }

    /// Free the engine context. Pending jobs are discarded and the active one
    /// is aborted first.
    pub fn release(&self) {
        self.cancel_everything("release");
        let mut slot = self.slot.lock();
        if self.slot.release(&mut slot) {
            info!("Model released");
        }
    }

    /// True while a model is loaded. Never blocks.
    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }

    /// Name of the loaded model.
    pub fn model_name(&self) -> Option<String> {
        self.slot.model_name()
    }

    /// Caller notified through `on_model_ready` after every successful load.
    pub fn set_ready_listener(&self, listener: CallerHandle) {
        *self
            .ready_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    fn ready_listener(&self) -> Option<CallerHandle> {
        self.ready_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Submit little-endian 16-bit mono PCM. Never blocks on conversion or
    /// inference.
    pub fn submit_pcm16(
        &self,
        caller: CallerHandle,
        bytes: Vec<u8>,
        sample_rate: u32,
        job_id: i32,
        flag: u8,
    ) {
        self.submit(caller, RawAudio::Pcm16(bytes), sample_rate, job_id, flag);
    }

    /// Submit mono `f32` samples in `[-1.0, 1.0]`. Never blocks on
    /// conversion or inference.
    pub fn submit_f32(
        &self,
        caller: CallerHandle,
        samples: Vec<f32>,
        sample_rate: u32,
        job_id: i32,
        flag: u8,
    ) {
        self.submit(caller, RawAudio::Float(samples), sample_rate, job_id, flag);
    }

    fn submit(
        &self,
        caller: CallerHandle,
        audio: RawAudio,
        sample_rate: u32,
        job_id: i32,
        flag: u8,
    ) -> bool {
        if !self.is_ready() {
            debug!(job_id, "Submission while no model is loaded");
        }
        let submission = Submission {
            caller,
            job_id,
            flag,
            audio,
            sample_rate,
            generation: self.queue.generation(),
        };
        match &self.admission_tx {
            Some(tx) if tx.send(submission).is_ok() => true,
            _ => {
                warn!(job_id, "Recognizer is shutting down, submission dropped");
                false
            }
        }
    }

    /// Set the recognition language for jobs started from now on.
    ///
    /// Unknown values are logged and ignored.
    pub fn set_language(&self, language: &str) {
        match resolve_language(language) {
            Some(code) => {
                let mut params = self.params.lock().unwrap_or_else(|e| e.into_inner());
                if params.language != code {
                    info!(language = %code, "Recognition language changed");
                    params.language = code;
                }
            }
            None => warn!(language, "Unknown language, keeping current setting"),
        }
    }

    /// Current recognition language.
    pub fn language(&self) -> String {
        self.params
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .language
            .clone()
    }

    /// Abort the active job and discard every pending one, whoever submitted
    /// them. Does not wait for the abort to take effect.
    pub fn stop(&self, caller: &CallerHandle) {
        self.cancel_everything(caller.name());
    }

    fn cancel_everything(&self, requested_by: &str) {
        let dropped = self.queue.cancel_all();
        debug!(requested_by, dropped, "Recognition stopped");
    }

    /// Jobs admitted but not started yet.
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Recognize `samples` through the queue and wait for the result.
    ///
    /// # Errors
    /// `ModelNotLoaded` without a model, `Aborted` if the job is stopped, or
    /// the reason the job was dropped.
    pub fn recognize_blocking(&self, samples: Vec<f32>, sample_rate: u32) -> Result<RecognitionResult> {
        if !self.is_ready() {
            return Err(VoxError::ModelNotLoaded);
        }

        let (sink, events) = ChannelSink::channel();
        if !self.submit(Arc::new(sink), RawAudio::Float(samples), sample_rate, 0, 0) {
            return Err(VoxError::ShuttingDown);
        }

        // The sink is dropped with the job, so a discarded job ends the loop
        loop {
            match events.recv() {
                Ok(SinkEvent::Result(result)) => return Ok(result),
                Ok(SinkEvent::Dropped { reason, .. }) => return Err(drop_reason_error(reason)),
                Ok(SinkEvent::ModelReady(_)) => continue,
                Err(_) => return Err(VoxError::Aborted),
            }
        }
    }
}

fn drop_reason_error(reason: DropReason) -> VoxError {
    match reason {
        DropReason::Admission(message) => VoxError::AudioRejected { message },
        DropReason::ModelNotLoaded => VoxError::ModelNotLoaded,
        DropReason::InferenceFailed(message) => VoxError::InferenceFailed { message },
    }
}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recognizer")
            .field("engine", &self.loader.name())
            .field("ready", &self.is_ready())
            .field("model_name", &self.model_name())
            .field("language", &self.language())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        self.cancel_everything("shutdown");

        // Closing the channel ends the admission loop
        self.admission_tx.take();
        if let Some(handle) = self.admission_handle.take()
            && handle.join().is_err()
        {
            warn!("Admission thread panicked");
        }

        self.dispatcher.join();

        delivery::post(&self.delivery_tx, Delivery::Shutdown);
        if let Some(handle) = self.delivery_handle.take()
            && handle.join().is_err()
        {
            warn!("Delivery thread panicked");
        }
        debug!("Recognizer shut down");
    }
}
