//! Dispatcher metrics for observability
//!
//! Counters for submitted, filtered, dropped and delivered events plus queue
//! pressure. All counters are relaxed atomics; read them as approximations
//! while logging is in flight, exact values after a flush.

use std::sync::atomic::{AtomicU64, Ordering};

/// # Example
///
/// ```
/// use rust_log_dispatcher::DispatchMetrics;
///
/// let metrics = DispatchMetrics::new();
/// metrics.record_submitted();
/// metrics.record_dropped();
///
/// assert_eq!(metrics.submitted(), 1);
/// assert_eq!(metrics.dropped_count(), 1);
/// ```
#[derive(Debug)]
pub struct DispatchMetrics {
    /// Events accepted into the delivery queue
    submitted: AtomicU64,

    /// Events discarded because no sink accepts their severity
    filtered: AtomicU64,

    /// Events lost to queue overflow
    dropped_count: AtomicU64,

    /// Successful sink deliveries (one event to two sinks counts twice)
    delivered: AtomicU64,

    /// Sink deliveries that returned an error or panicked
    delivery_failures: AtomicU64,

    /// Deliveries skipped because the sink's formatter returned `None`
    suppressed: AtomicU64,

    /// Number of times the queue was found full
    queue_full_events: AtomicU64,

    /// Number of times a producer blocked waiting for queue space
    block_events: AtomicU64,
}

impl DispatchMetrics {
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_submitted(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_filtered(&self) -> u64 {
        self.filtered.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a dropped event, returning the previous drop count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped_count.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivered(&self) -> u64 {
        self.delivered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivery_failure(&self) -> u64 {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_suppressed(&self) -> u64 {
        self.suppressed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_queue_full(&self) -> u64 {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of submitted-or-dropped events lost to overflow, in percent
    ///
    /// Returns 0.0 if nothing has been logged.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_count() as f64;
        let total = self.submitted() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.submitted,
            &self.filtered,
            &self.dropped_count,
            &self.delivered,
            &self.delivery_failures,
            &self.suppressed,
            &self.queue_full_events,
            &self.block_events,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DispatchMetrics {
    /// Snapshot of the current values
    fn clone(&self) -> Self {
        Self {
            submitted: AtomicU64::new(self.submitted()),
            filtered: AtomicU64::new(self.filtered()),
            dropped_count: AtomicU64::new(self.dropped_count()),
            delivered: AtomicU64::new(self.delivered()),
            delivery_failures: AtomicU64::new(self.delivery_failures()),
            suppressed: AtomicU64::new(self.suppressed()),
            queue_full_events: AtomicU64::new(self.queue_full_events()),
            block_events: AtomicU64::new(self.block_events()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.submitted(), 0);
        assert_eq!(metrics.dropped_count(), 0);
        assert_eq!(metrics.delivered(), 0);
        assert_eq!(metrics.queue_full_events(), 0);
    }

    #[test]
    fn test_record_returns_previous_value() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.record_dropped(), 0);
        assert_eq!(metrics.record_dropped(), 1);
        assert_eq!(metrics.dropped_count(), 2);
    }

    #[test]
    fn test_drop_rate() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.drop_rate(), 0.0);

        for _ in 0..90 {
            metrics.record_submitted();
        }
        for _ in 0..10 {
            metrics.record_dropped();
        }
        let rate = metrics.drop_rate();
        assert!((9.9..=10.1).contains(&rate), "Drop rate was {}", rate);
    }

    #[test]
    fn test_reset_and_snapshot() {
        let metrics = DispatchMetrics::new();
        metrics.record_delivered();
        metrics.record_delivery_failure();

        let snapshot = metrics.clone();
        metrics.reset();

        assert_eq!(metrics.delivered(), 0);
        assert_eq!(metrics.delivery_failures(), 0);
        assert_eq!(snapshot.delivered(), 1);
        assert_eq!(snapshot.delivery_failures(), 1);
    }
}
