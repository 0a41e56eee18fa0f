//! CPU-side view of the GPU timeline.

use lockstep_core::TimelineValue;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::GpuBackend;
use crate::error::Result;

/// Monotonic GPU progress counter.
///
/// The producer assigns values with [`signal`](Self::signal); the GPU reaches
/// them asynchronously. Observed completion is folded into a high-water mark,
/// so [`completed_value`](Self::completed_value) never goes backwards even if
/// a backend read is stale or several threads poll at once.
#[derive(Debug, Default)]
pub struct Timeline {
    last_signaled: TimelineValue,
    completed: AtomicU64,
}

impl Timeline {
    /// Create a timeline at value zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fresh value and ask the queue to mark it once all work
    /// enqueued so far completes.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn signal<B: GpuBackend>(&mut self, backend: &mut B) -> Result<TimelineValue> {
        let value = self.last_signaled.next();
        backend.signal(value)?;
        self.last_signaled = value;
        Ok(value)
    }

    /// Highest value the GPU has reached.
    pub fn completed_value<B: GpuBackend>(&self, backend: &B) -> Result<TimelineValue> {
        let observed = backend.completed_value()?.get();
        Ok(self.observe(observed))
    }

    /// Most recently assigned value.
    #[must_use]
    pub const fn last_signaled(&self) -> TimelineValue {
        self.last_signaled
    }

    /// Completion high-water mark without polling the backend.
    #[must_use]
    pub fn last_observed(&self) -> TimelineValue {
        TimelineValue::new(self.completed.load(Ordering::Acquire))
    }

    fn observe(&self, observed: u64) -> TimelineValue {
        let previous = self.completed.fetch_max(observed, Ordering::AcqRel);
        TimelineValue::new(previous.max(observed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn observe_never_decreases() {
        let timeline = Timeline::new();
        assert_eq!(timeline.observe(5).get(), 5);
        assert_eq!(timeline.observe(3).get(), 5);
        assert_eq!(timeline.observe(9).get(), 9);
        assert_eq!(timeline.last_observed().get(), 9);
    }

    #[test]
    fn concurrent_observers_are_monotonic() {
        let timeline = Arc::new(Timeline::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let timeline = Arc::clone(&timeline);
                thread::spawn(move || {
                    let mut last = 0;
                    for i in 0..1000u64 {
                        // Interleave stale and fresh readings.
                        let reading = if i % 3 == 0 { i / 2 } else { i + t };
                        let seen = timeline.observe(reading).get();
                        assert!(seen >= last);
                        last = seen;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(timeline.last_observed().get(), 998 + 3);
    }
}
