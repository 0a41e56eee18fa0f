//! Per-slot synchronization gate.
//!
//! The gate is the only place the CPU blocks on the GPU. Each frame slot has
//! one live [`SyncPoint`] pairing the value its last submission will reach
//! with a waitable event; the point is overwritten on every submission.

use lockstep_core::TimelineValue;
use std::time::{Duration, Instant};

use crate::backend::{GpuBackend, WaitStatus};
use crate::error::{GpuError, Result};
use crate::timeline::Timeline;

/// Timeline value paired with the event used to wait for it.
#[derive(Debug)]
pub struct SyncPoint<E> {
    value: TimelineValue,
    event: E,
}

impl<E> SyncPoint<E> {
    /// Value the slot's latest submission reaches on completion.
    #[must_use]
    pub const fn value(&self) -> TimelineValue {
        self.value
    }
}

/// How a gate wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Final status.
    pub status: WaitStatus,
    /// True if the calling thread actually blocked.
    pub blocked: bool,
    /// Time spent blocked.
    pub waited: Duration,
}

impl WaitOutcome {
    const READY: Self = Self {
        status: WaitStatus::Ready,
        blocked: false,
        waited: Duration::ZERO,
    };
}

/// Blocking wait primitive enforcing slot reuse after GPU completion.
pub struct SyncGate<E> {
    points: Vec<SyncPoint<E>>,
    drain_event: E,
}

impl<E> SyncGate<E> {
    /// Create one sync point per slot plus a dedicated drain event.
    pub fn new<B>(backend: &mut B, slots: usize) -> Result<Self>
    where
        B: GpuBackend<Event = E>,
    {
        let mut points = Vec::with_capacity(slots);
        for _ in 0..slots {
            points.push(SyncPoint {
                value: TimelineValue::ZERO,
                event: backend.create_event()?,
            });
        }
        Ok(Self {
            points,
            drain_event: backend.create_event()?,
        })
    }

    /// Number of sync points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the gate has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The live sync point of a slot.
    #[must_use]
    pub fn point(&self, slot: usize) -> &SyncPoint<E> {
        &self.points[slot]
    }

    /// Overwrite a slot's sync point after a submission.
    pub fn arm(&mut self, slot: usize, value: TimelineValue) {
        let point = &mut self.points[slot];
        debug_assert!(value >= point.value, "sync point moved backwards");
        point.value = value;
    }

    /// Block until the timeline reaches the value `slot` was last armed
    /// with, for at most `timeout`.
    ///
    /// Returns immediately when the value is already reached, so calling
    /// this twice for a satisfied slot never blocks. A slot that was never
    /// armed waits for value zero and is always ready.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait_until<B>(
        &self,
        backend: &B,
        timeline: &Timeline,
        slot: usize,
        timeout: Duration,
    ) -> Result<WaitOutcome>
    where
        B: GpuBackend<Event = E>,
    {
        let point = self
            .points
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("no sync point for slot {slot}")))?;
        if point.value.is_reached_by(timeline.completed_value(backend)?) {
            return Ok(WaitOutcome::READY);
        }
        Self::block_on(backend, timeline, &point.event, point.value, timeout)
    }

    /// Wait without a deadline until the timeline reaches `value`.
    ///
    /// Used as a correctness barrier before swap-chain resizes and shutdown.
    pub fn drain<B>(&self, backend: &B, timeline: &Timeline, value: TimelineValue) -> Result<WaitOutcome>
    where
        B: GpuBackend<Event = E>,
    {
        if value.is_reached_by(timeline.completed_value(backend)?) {
            return Ok(WaitOutcome::READY);
        }
        let outcome = Self::block_on(backend, timeline, &self.drain_event, value, Duration::MAX)?;
        if outcome.status == WaitStatus::TimedOut {
            return Err(GpuError::TimedOut {
                value,
                timeout: Duration::MAX,
            });
        }
        Ok(outcome)
    }

    /// Release the events.
    pub fn destroy<B>(self, backend: &mut B)
    where
        B: GpuBackend<Event = E>,
    {
        for point in self.points {
            backend.destroy_event(point.event);
        }
        backend.destroy_event(self.drain_event);
    }

    fn block_on<B>(
        backend: &B,
        timeline: &Timeline,
        event: &E,
        value: TimelineValue,
        timeout: Duration,
    ) -> Result<WaitOutcome>
    where
        B: GpuBackend<Event = E>,
    {
        tracing::trace!("Blocking on timeline value {value}");
        let start = Instant::now();
        let status = backend.wait_event(event, value, timeout)?;
        if status == WaitStatus::Ready {
            // Fold the new completion into the high-water mark.
            timeline.completed_value(backend)?;
        }
        Ok(WaitOutcome {
            status,
            blocked: true,
            waited: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::{QueueMode, SoftDevice, SoftDeviceConfig};
    use std::thread;

    fn manual_device() -> SoftDevice {
        SoftDevice::new(SoftDeviceConfig::default().with_mode(QueueMode::Manual)).unwrap()
    }

    #[test]
    fn satisfied_wait_does_not_block() {
        let mut device = SoftDevice::new(SoftDeviceConfig::default().with_mode(QueueMode::Immediate))
            .unwrap();
        let mut timeline = Timeline::new();
        let mut gate = SyncGate::new(&mut device, 2).unwrap();
        let value = timeline.signal(&mut device).unwrap();
        gate.arm(0, value);

        for _ in 0..2 {
            let outcome = gate
                .wait_until(&device, &timeline, 0, Duration::from_millis(1))
                .unwrap();
            assert_eq!(outcome.status, WaitStatus::Ready);
            assert!(!outcome.blocked);
        }
        gate.destroy(&mut device);
    }

    #[test]
    fn wait_reports_timeout() {
        let mut device = manual_device();
        let mut timeline = Timeline::new();
        let mut gate = SyncGate::new(&mut device, 2).unwrap();
        let value = timeline.signal(&mut device).unwrap();
        gate.arm(0, value);

        let outcome = gate
            .wait_until(&device, &timeline, 0, Duration::from_millis(5))
            .unwrap();
        assert_eq!(outcome.status, WaitStatus::TimedOut);
        assert!(outcome.blocked);

        // The other slot was never armed.
        let outcome = gate
            .wait_until(&device, &timeline, 1, Duration::from_millis(5))
            .unwrap();
        assert_eq!(outcome.status, WaitStatus::Ready);
        assert!(!outcome.blocked);
    }

    #[test]
    fn drain_blocks_until_released() {
        let mut device = manual_device();
        let control = device.control();
        let mut timeline = Timeline::new();
        let mut gate = SyncGate::new(&mut device, 2).unwrap();
        let first = timeline.signal(&mut device).unwrap();
        gate.arm(0, first);
        let second = timeline.signal(&mut device).unwrap();
        gate.arm(1, second);
        assert_eq!(gate.point(1).value(), second);

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            control.complete_all();
        });
        let outcome = gate.drain(&device, &timeline, second).unwrap();
        releaser.join().unwrap();

        assert_eq!(outcome.status, WaitStatus::Ready);
        assert!(outcome.blocked);
        assert_eq!(timeline.last_observed(), second);
    }

    #[test]
    fn unknown_slot_is_an_error() {
        let mut device = manual_device();
        let timeline = Timeline::new();
        let gate = SyncGate::new(&mut device, 1).unwrap();
        let err = gate
            .wait_until(&device, &timeline, 4, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
    }
}
