//! Token cleanup and word-level merging.
//!
//! The engine reports tokens with their own time ranges. Service markers are
//! dropped, non-speech symbols are stripped, and a token that lands on the
//! time slot of the previous word replaces it: the engine sometimes re-emits
//! a revised token for the same position and only the last revision counts.

use crate::defaults::{ENGINE_TICK_MS, WORD_MERGE_TOLERANCE_SECS};
use serde::{Deserialize, Serialize};

/// Prefixes of the engine's structural tokens (start/end of transcript,
/// timestamps, language tags, task markers).
const SERVICE_TOKEN_PREFIXES: &[&str] = &[
    "[_TT_",
    "[_EOT_]",
    "[_SOT_]",
    "[_TRANSLATE_]",
    "[_TRANSCRIBE_]",
    "[_SOLM_]",
    "[_PREV_]",
    "[_NOSP_]",
    "[_NOT_]",
    "[_BEG_]",
    "[_LANG_",
    "[_extra_token_",
];

/// Punctuation, brackets and musical notation the engine uses for non-speech.
const NON_SPEECH_SYMBOLS: &[char] = &[
    '"', '#', '(', ')', '*', '+', '/', ':', ';', '<', '=', '>', '@', '[', '\\', ']', '^', '_',
    '`', '{', '|', '}', '~', '「', '」', '『', '』', '-', '♪', '♩', '♫', '♬', '♭', '♮', '♯', '.',
    ',', '!', '?',
];

/// One recognized word with its time range in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordEntry {
    pub text: String,
    pub start: f32,
    pub end: f32,
}

impl WordEntry {
    pub fn new(text: impl Into<String>, start: f32, end: f32) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// True if both bounds lie within `tolerance` seconds of `other`'s.
    pub fn overlaps_slot(&self, start: f32, end: f32, tolerance: f32) -> bool {
        (self.start - start).abs() <= tolerance && (self.end - end).abs() <= tolerance
    }
}

/// True for engine service markers such as `[_SOT_]` or `[_TT_150]`.
pub fn is_service_token(raw: &str) -> bool {
    SERVICE_TOKEN_PREFIXES
        .iter()
        .any(|prefix| raw.starts_with(prefix))
}

/// Turn a raw engine token into a canonical word.
///
/// Returns `None` for service markers and for tokens that are empty once
/// non-speech symbols are removed. Applying it to its own output is a no-op.
pub fn normalize(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if is_service_token(raw) {
        return None;
    }

    let stripped: String = raw
        .chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| !NON_SPEECH_SYMBOLS.contains(c))
        .collect();

    let word = stripped.to_lowercase().trim().to_string();
    if word.is_empty() { None } else { Some(word) }
}

/// What [`WordList::push`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Appended,
    Replaced,
}

/// Ordered words of one transcript with the replace-on-same-slot rule applied.
#[derive(Debug, Clone, PartialEq)]
pub struct WordList {
    entries: Vec<WordEntry>,
    tolerance: f32,
}

impl Default for WordList {
    fn default() -> Self {
        Self::with_tolerance(WORD_MERGE_TOLERANCE_SECS)
    }
}

impl WordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: f32) -> Self {
        Self {
            entries: Vec::new(),
            tolerance,
        }
    }

    /// Normalize `raw` and add it. Returns the merge action, or `None` if
    /// the token was rejected.
    pub fn push_token(&mut self, raw: &str, start: f32, end: f32) -> Option<MergeAction> {
        let text = normalize(raw)?;
        Some(self.push(WordEntry::new(text, start, end)))
    }

    /// Add an already-normalized entry, replacing the last one if it
    /// occupies the same time slot.
    pub fn push(&mut self, entry: WordEntry) -> MergeAction {
        if let Some(last) = self.entries.last_mut()
            && last.overlaps_slot(entry.start, entry.end, self.tolerance)
        {
            *last = entry;
            return MergeAction::Replaced;
        }
        self.entries.push(entry);
        MergeAction::Appended
    }

    pub fn entries(&self) -> &[WordEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<WordEntry> {
        self.entries
    }

    pub fn last(&self) -> Option<&WordEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Convert engine ticks to seconds.
pub fn ticks_to_seconds(ticks: i64) -> f32 {
    (ticks * ENGINE_TICK_MS) as f32 / 1000.0
}

/// Format engine ticks as `hh:mm:ss.mmm`.
pub fn ticks_to_timestamp(ticks: i64) -> String {
    let total_ms = ticks.max(0) * ENGINE_TICK_MS;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Format seconds as `hh:mm:ss.mmm`.
pub fn seconds_to_timestamp(seconds: f32) -> String {
    ticks_to_timestamp((seconds * 1000.0 / ENGINE_TICK_MS as f32).round() as i64)
}
