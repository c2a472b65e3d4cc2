//! Builds one job's transcript from the engine's callback stream.

use crate::defaults::WORD_MERGE_TOLERANCE_SECS;
use crate::engine::{EngineSegment, InferenceCallbacks};
use crate::recognizer::cancel::CancellationFlag;
use crate::recognizer::words::{WordList, ticks_to_seconds};
use tracing::{debug, trace};

/// Output accumulated for the active job.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptState {
    /// Concatenated raw segment text.
    pub recognized_string: String,
    /// Normalized, merged words with time ranges.
    pub recognized_data: WordList,
}

impl TranscriptState {
    pub fn new(merge_tolerance: f32) -> Self {
        Self {
            recognized_string: String::new(),
            recognized_data: WordList::with_tolerance(merge_tolerance),
        }
    }
}

impl Default for TranscriptState {
    fn default() -> Self {
        Self::new(WORD_MERGE_TOLERANCE_SECS)
    }
}

/// Collapse runs of spaces to one and trim the ends.
pub fn finalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_space = false;
    for c in raw.chars() {
        if c == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
    }
    out.trim().to_string()
}

/// Callback consumer for a single inference run.
///
/// A fresh assembler is created for every job, so state never leaks between
/// jobs. It is only touched from the worker running that job.
#[derive(Debug)]
pub struct Assembler {
    state: TranscriptState,
    cancel: CancellationFlag,
    merge_tolerance: f32,
    segments_seen: usize,
    completed: bool,
}

impl Assembler {
    pub fn new(cancel: CancellationFlag, merge_tolerance: f32) -> Self {
        Self {
            state: TranscriptState::new(merge_tolerance),
            cancel,
            merge_tolerance,
            segments_seen: 0,
            completed: false,
        }
    }

    /// Drop everything accumulated so far.
    pub fn reset(&mut self) {
        self.state = TranscriptState::new(self.merge_tolerance);
        self.segments_seen = 0;
        self.completed = false;
    }

    pub fn state(&self) -> &TranscriptState {
        &self.state
    }

    /// True once the terminal `on_progress(100)` was seen.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn segments_seen(&self) -> usize {
        self.segments_seen
    }

    /// Hand out the finished transcript. `None` if the run never reached
    /// 100% progress.
    pub fn into_transcript(self) -> Option<TranscriptState> {
        self.completed.then_some(self.state)
    }
}

impl InferenceCallbacks for Assembler {
    fn on_encoder_begin(&mut self) -> bool {
        !self.cancel.is_raised()
    }

    fn on_new_segment(&mut self, segments: &[EngineSegment], new_count: usize) {
        let total = segments.len();
        let start = total.saturating_sub(new_count);

        for segment in &segments[start..] {
            debug!(text = %segment.text, "recognized text segment");
            self.state.recognized_string.push_str(&segment.text);

            for token in &segment.tokens {
                let accepted = self.state.recognized_data.push_token(
                    token.text.trim(),
                    ticks_to_seconds(token.t0),
                    ticks_to_seconds(token.t1),
                );
                trace!(token = %token.text, ?accepted, "token");
            }
        }
        self.segments_seen += total - start;
    }

    fn on_progress(&mut self, percent: i32) {
        let percent = percent.clamp(0, 100);
        debug!(percent, "recognition progress");

        if percent == 100 && !self.completed {
            self.state.recognized_string = finalize_text(&self.state.recognized_string);
            self.completed = true;
        }
    }

    fn on_abort_check(&self) -> bool {
        self.cancel.is_raised()
    }

    fn abort_handle(&self) -> CancellationFlag {
        self.cancel.clone()
    }
}
