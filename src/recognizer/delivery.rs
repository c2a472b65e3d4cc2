//! Delivery context: the only thread that invokes [`ResultSink`] hooks.
//!
//! [`ResultSink`]: crate::sink::ResultSink

use crate::error::Result;
use crate::sink::{CallerHandle, DropReason, RecognitionResult};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// Message handed from the worker (or admission) side to the delivery thread.
pub(crate) enum Delivery {
    Result {
        caller: CallerHandle,
        result: RecognitionResult,
    },
    Dropped {
        caller: CallerHandle,
        job_id: i32,
        flag: u8,
        reason: DropReason,
    },
    ModelReady {
        caller: CallerHandle,
        model_name: String,
    },
    Shutdown,
}

/// Send a message to the delivery thread, logging if it is already gone.
pub(crate) fn post(tx: &Sender<Delivery>, message: Delivery) {
    if tx.send(message).is_err() {
        debug!("Delivery thread stopped, message discarded");
    }
}

/// Spawn the delivery thread. It runs until it receives [`Delivery::Shutdown`]
/// or every sender is dropped.
pub(crate) fn spawn(rx: Receiver<Delivery>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("voxqueue-delivery".to_string())
        .spawn(move || run(rx))?;
    Ok(handle)
}

fn run(rx: Receiver<Delivery>) {
    for message in rx {
        match message {
            Delivery::Result { caller, result } => {
                trace!(sink = caller.name(), job_id = result.job_id, "delivering result");
                isolated(caller.name(), "on_result", || caller.on_result(result));
            }
            Delivery::Dropped {
                caller,
                job_id,
                flag,
                reason,
            } => isolated(caller.name(), "on_dropped", || {
                caller.on_dropped(job_id, flag, &reason)
            }),
            Delivery::ModelReady { caller, model_name } => {
                isolated(caller.name(), "on_model_ready", || {
                    caller.on_model_ready(&model_name)
                })
            }
            Delivery::Shutdown => break,
        }
    }
    debug!("Delivery thread exiting");
}

/// Run one sink hook. A panicking sink must not take down delivery for
/// every other caller.
fn isolated<F: FnOnce()>(sink: &str, hook: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(sink, hook, "Result sink panicked, delivery continues");
    }
}
