//! Software fence with event-on-completion.

use lockstep_core::TimelineValue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::FenceEvent;

/// A 64-bit fence advanced by the queue.
///
/// Events registered with [`set_event_on_completion`](Self::set_event_on_completion)
/// fire once, when the fence reaches their value.
#[derive(Debug, Default)]
pub(crate) struct SoftFence {
    completed: AtomicU64,
    waiters: Mutex<Vec<(TimelineValue, Arc<FenceEvent>)>>,
}

impl SoftFence {
    pub(crate) fn completed(&self) -> TimelineValue {
        TimelineValue::new(self.completed.load(Ordering::Acquire))
    }

    /// Advance the fence and fire every event whose value is now reached.
    pub(crate) fn complete(&self, value: TimelineValue) {
        self.completed.fetch_max(value.get(), Ordering::AcqRel);
        let reached = self.completed();
        let mut waiters = self.waiters.lock();
        waiters.retain(|(target, event)| {
            if target.is_reached_by(reached) {
                event.set();
                false
            } else {
                true
            }
        });
    }

    /// Fire `event` when the fence reaches `value`, immediately if it already has.
    pub(crate) fn set_event_on_completion(&self, value: TimelineValue, event: &Arc<FenceEvent>) {
        // Checked under the waiter lock so a concurrent `complete` either
        // sees the registration or is seen by the check.
        let mut waiters = self.waiters.lock();
        if value.is_reached_by(self.completed()) {
            event.set();
        } else {
            waiters.push((value, Arc::clone(event)));
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_waiters(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_immediately_when_reached() {
        let fence = SoftFence::default();
        fence.complete(TimelineValue::new(2));
        let event = Arc::new(FenceEvent::new());
        fence.set_event_on_completion(TimelineValue::new(1), &event);
        assert!(event.is_set());
        assert_eq!(fence.pending_waiters(), 0);
    }

    #[test]
    fn fires_on_completion() {
        let fence = SoftFence::default();
        let event = Arc::new(FenceEvent::new());
        fence.set_event_on_completion(TimelineValue::new(3), &event);
        fence.complete(TimelineValue::new(2));
        assert!(!event.is_set());
        fence.complete(TimelineValue::new(3));
        assert!(event.wait(Duration::ZERO));
        assert_eq!(fence.pending_waiters(), 0);
    }

    #[test]
    fn never_moves_backwards() {
        let fence = SoftFence::default();
        fence.complete(TimelineValue::new(7));
        fence.complete(TimelineValue::new(4));
        assert_eq!(fence.completed().get(), 7);
    }
}
