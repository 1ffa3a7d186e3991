//! Progress reporting and cooperative cancellation

use crate::config::ResolutionSpec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives `(completed, total)` after each coarse unit of export work
pub trait ProgressListener: Send {
    fn update_progress(&mut self, completed: usize, total: usize);
}

impl<F> ProgressListener for F
where
    F: FnMut(usize, usize) + Send,
{
    fn update_progress(&mut self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Number of progress units for an export: one for metadata, then per view
/// and timepoint one for loading the source plus one per level
pub fn total_units(num_timepoints: usize, levels_per_view: &[Vec<ResolutionSpec>]) -> usize {
    1 + levels_per_view
        .iter()
        .map(|levels| num_timepoints * (levels.len() + 1))
        .sum::<usize>()
}

/// Counts completed units and forwards them to an optional listener
pub(crate) struct ProgressTracker {
    listener: Option<Box<dyn ProgressListener>>,
    completed: usize,
    total: usize,
}

impl ProgressTracker {
    pub(crate) fn new(listener: Option<Box<dyn ProgressListener>>, total: usize) -> Self {
        Self {
            listener,
            completed: 0,
            total,
        }
    }

    /// Report the starting point `(0, total)`
    pub(crate) fn start(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener.update_progress(0, self.total);
        }
    }

    /// Mark one more unit complete
    pub(crate) fn tick(&mut self) {
        debug_assert!(self.completed < self.total);
        self.completed += 1;
        if let Some(listener) = self.listener.as_mut() {
            listener.update_progress(self.completed, self.total);
        }
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed
    }

    pub(crate) fn into_listener(self) -> Option<Box<dyn ProgressListener>> {
        self.listener
    }
}

/// Shared flag requesting that a running export stop at the next cell
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_total_units() {
        let two_levels = vec![
            ResolutionSpec::new([1, 1, 1], [4, 4, 4]),
            ResolutionSpec::new([2, 2, 2], [4, 4, 4]),
        ];
        let one_level = vec![ResolutionSpec::new([1, 1, 1], [4, 4, 4])];
        assert_eq!(total_units(3, &[two_levels.clone()]), 1 + 3 * 3);
        assert_eq!(total_units(2, &[two_levels, one_level]), 1 + 2 * 3 + 2 * 2);
    }

    #[test]
    fn test_tracker_reports_increasing_counts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |done: usize, total: usize| sink.lock().unwrap().push((done, total));

        let mut tracker = ProgressTracker::new(Some(Box::new(listener)), 2);
        tracker.start();
        tracker.tick();
        tracker.tick();
        assert_eq!(tracker.completed(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
