//! Progress tracking for batch processing.

use crate::batch::types::BatchProgress;
use std::time::{Duration, Instant};

/// Accumulates coordinator progress snapshots for display.
#[derive(Debug, Clone)]
pub struct BatchProgressTracker {
    /// Total number of files to process.
    pub total: usize,
    /// Number of files with a terminal outcome.
    pub completed: usize,
    /// Number of workers currently running.
    pub active: usize,
    /// Number of files waiting for a pool slot.
    pub queued: usize,
    pub successful: usize,
    pub failed: usize,
    /// Start time of batch execution.
    pub start_time: Instant,
    /// Durations of completed files.
    pub durations: Vec<Duration>,
}

impl BatchProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            active: 0,
            queued: total,
            successful: 0,
            failed: 0,
            start_time: Instant::now(),
            durations: Vec::new(),
        }
    }

    /// Apply a snapshot from the coordinator.
    pub fn update(&mut self, progress: &BatchProgress) {
        if progress.completed > self.completed {
            self.durations.push(progress.last_duration);
        }
        self.completed = progress.completed;
        self.active = progress.active;
        self.queued = progress.queued();
        self.successful = progress.successful;
        self.failed = progress.failed;
    }

    /// Estimated time remaining, e.g. "2m 15s".
    ///
    /// Assumes remaining files take the average observed duration and that
    /// `parallelism` of them run at once.
    pub fn calculate_eta(&self, parallelism: usize) -> String {
        if self.durations.is_empty() || self.completed == 0 {
            return "calculating...".to_string();
        }

        let avg_duration = self.durations.iter().sum::<Duration>() / self.durations.len() as u32;
        let remaining = self.total.saturating_sub(self.completed) as u32;
        let waves = remaining.div_ceil(parallelism.max(1) as u32);

        format_duration(avg_duration * waves)
    }

    /// Average duration per file.
    pub fn average_duration(&self) -> String {
        if self.durations.is_empty() {
            return "0s".to_string();
        }

        let avg = self.durations.iter().sum::<Duration>() / self.durations.len() as u32;
        format_duration(avg)
    }

    /// Time since the tracker was created, e.g. "1m 15s".
    pub fn elapsed(&self) -> String {
        format_duration(self.start_time.elapsed())
    }

    /// Get completion percentage.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }
}

/// Format duration as human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_new() {
        let tracker = BatchProgressTracker::new(100);
        assert_eq!(tracker.total, 100);
        assert_eq!(tracker.completed, 0);
        assert_eq!(tracker.queued, 100);
    }

    #[test]
    fn test_progress_tracker_update() {
        let mut tracker = BatchProgressTracker::new(100);
        tracker.update(&BatchProgress {
            total: 100,
            completed: 45,
            active: 5,
            successful: 42,
            failed: 3,
            last_duration: Duration::from_millis(20),
        });
        assert_eq!(tracker.completed, 45);
        assert_eq!(tracker.active, 5);
        assert_eq!(tracker.queued, 50);
        assert_eq!(tracker.successful, 42);
        assert_eq!(tracker.failed, 3);
        assert_eq!(tracker.durations, vec![Duration::from_millis(20)]);
    }

    #[test]
    fn test_elapsed_since_start() {
        let mut tracker = BatchProgressTracker::new(3);
        tracker.start_time = Instant::now().checked_sub(Duration::from_secs(75)).unwrap();
        assert_eq!(tracker.elapsed(), "1m 15s");
    }

    #[test]
    fn test_calculate_eta() {
        let mut tracker = BatchProgressTracker::new(10);
        tracker.durations = vec![Duration::from_secs(2), Duration::from_secs(4)];
        tracker.completed = 2;

        // 8 remaining at 3s each, 4 at a time
        assert_eq!(tracker.calculate_eta(4), "6s");
        assert_eq!(BatchProgressTracker::new(10).calculate_eta(4), "calculating...");
    }

    #[test]
    fn test_percentage() {
        let mut tracker = BatchProgressTracker::new(100);
        tracker.completed = 45;
        assert!((tracker.percentage() - 45.0).abs() < 0.1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
        assert_eq!(format_duration(Duration::from_secs(7)), "7s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }
}
