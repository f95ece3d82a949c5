//! Rolling outcome window for circuit decisions.
//!
//! The window is split into fixed-width buckets; buckets older than the
//! window length are discarded lazily whenever the window is touched.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of one protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    /// Bulkhead or pool rejection.
    Rejected,
}

/// Aggregated counts over the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCounts {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
    pub rejected: u64,
}

impl HealthCounts {
    pub fn total(&self) -> u64 {
        self.success + self.errors()
    }

    pub fn errors(&self) -> u64 {
        self.failure + self.timeout + self.rejected
    }

    /// Error percentage, 0 when nothing was recorded.
    pub fn error_percentage(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        ((self.errors() * 100) / total) as u32
    }

    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
            Outcome::Timeout => self.timeout += 1,
            Outcome::Rejected => self.rejected += 1,
        }
    }

    fn merge(&mut self, other: &HealthCounts) {
        self.success += other.success;
        self.failure += other.failure;
        self.timeout += other.timeout;
        self.rejected += other.rejected;
    }
}

#[derive(Debug)]
struct Bucket {
    start: Instant,
    counts: HealthCounts,
}

/// Bucketed rolling window.
#[derive(Debug)]
pub struct RollingWindow {
    length: Duration,
    bucket_width: Duration,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    pub fn new(length: Duration, buckets: u32) -> Self {
        let length = length.max(Duration::from_millis(1));
        let bucket_width = (length / buckets.max(1)).max(Duration::from_millis(1));
        Self {
            length,
            bucket_width,
            buckets: VecDeque::with_capacity(buckets.max(1) as usize + 1),
        }
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    pub fn record(&mut self, outcome: Outcome, now: Instant) {
        self.prune(now);
        let needs_bucket = match self.buckets.back() {
            Some(bucket) => now.saturating_duration_since(bucket.start) >= self.bucket_width,
            None => true,
        };
        if needs_bucket {
            self.buckets.push_back(Bucket {
                start: now,
                counts: HealthCounts::default(),
            });
        }
        if let Some(bucket) = self.buckets.back_mut() {
            bucket.counts.add(outcome);
        }
    }

    pub fn counts(&mut self, now: Instant) -> HealthCounts {
        self.prune(now);
        let mut total = HealthCounts::default();
        for bucket in &self.buckets {
            total.merge(&bucket.counts);
        }
        total
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.start) >= self.length {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_percentage() {
        let mut window = RollingWindow::new(Duration::from_secs(10), 10);
        let now = Instant::now();
        window.record(Outcome::Success, now);
        window.record(Outcome::Failure, now);
        window.record(Outcome::Timeout, now);
        window.record(Outcome::Rejected, now);

        let counts = window.counts(now);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.errors(), 3);
        assert_eq!(counts.error_percentage(), 75);
    }

    #[test]
    fn test_old_buckets_expire() {
        let mut window = RollingWindow::new(Duration::from_secs(10), 10);
        let start = Instant::now();
        window.record(Outcome::Failure, start);
        window.record(Outcome::Failure, start + Duration::from_secs(5));
        window.record(Outcome::Success, start + Duration::from_secs(9));

        assert_eq!(window.counts(start + Duration::from_secs(9)).total(), 3);
        // First bucket falls out of the window
        let counts = window.counts(start + Duration::from_secs(11));
        assert_eq!(counts.failure, 1);
        assert_eq!(counts.success, 1);
        assert_eq!(window.counts(start + Duration::from_secs(30)).total(), 0);
    }

    #[test]
    fn test_empty_window_is_healthy() {
        let mut window = RollingWindow::new(Duration::from_secs(1), 4);
        assert_eq!(window.counts(Instant::now()).error_percentage(), 0);
        assert_eq!(window.bucket_width(), Duration::from_millis(250));
    }
}
