//! Auto-reset waitable event.
//!
//! The CPU-side half of a fence wait: the GPU side calls [`FenceEvent::set`]
//! when the value the event was registered for is reached.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// An auto-reset event.
///
/// A successful [`wait`](Self::wait) consumes the signal.
#[derive(Debug, Default)]
pub struct FenceEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl FenceEvent {
    /// Create an unsignaled event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event, waking one waiter.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    /// Clear a pending signal.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Returns true if a signal is pending.
    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until signaled or `timeout` elapses.
    ///
    /// Returns `true` if the event was signaled. `Duration::MAX` waits forever.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut signaled = self.signaled.lock();
        while !*signaled {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut signaled),
            }
        }
        std::mem::replace(&mut *signaled, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_when_unsignaled() {
        let event = FenceEvent::new();
        assert!(!event.wait(Duration::from_millis(5)));
    }

    #[test]
    fn signal_is_consumed() {
        let event = FenceEvent::new();
        event.set();
        assert!(event.is_set());
        assert!(event.wait(Duration::from_millis(5)));
        assert!(!event.is_set());
        assert!(!event.wait(Duration::from_millis(1)));
    }

    #[test]
    fn wakes_waiter_on_other_thread() {
        let event = Arc::new(FenceEvent::new());
        let setter = Arc::clone(&event);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set();
        });
        assert!(event.wait(Duration::MAX));
        handle.join().unwrap();
    }
}
