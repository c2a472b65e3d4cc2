//! Request admission, single-flight dispatch and transcript assembly.

pub mod assembler;
pub mod cancel;
pub(crate) mod delivery;
pub mod dispatcher;
pub mod queue;
pub mod request;
pub mod service;
pub mod words;

pub use assembler::{Assembler, TranscriptState, finalize_text};
pub use cancel::CancellationFlag;
pub use dispatcher::JobOutcome;
pub use queue::RequestQueue;
pub use request::RecognitionRequest;
pub use service::Recognizer;
pub use words::{MergeAction, WordEntry, WordList, normalize};
