//! Process-wide stop request shared by the recognizer and the engine binding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable abort flag.
///
/// Not job-scoped: raising it aborts whichever job is running. The dispatcher
/// clears it when it starts the next job.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    raised: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_cleared() {
        assert!(!CancellationFlag::new().is_raised());
    }

    #[test]
    fn clones_share_state() {
        let flag = CancellationFlag::new();
        let probe = flag.clone();

        flag.raise();
        assert!(probe.is_raised());

        probe.clear();
        assert!(!flag.is_raised());
    }

    #[test]
    fn visible_across_threads() {
        let flag = CancellationFlag::new();
        let remote = flag.clone();
        std::thread::spawn(move || remote.raise()).join().unwrap();
        assert!(flag.is_raised());
    }
}
