//! Frame slots and the round-robin pool that owns them.

use lockstep_core::TimelineValue;
use lockstep_gpu::{GpuBackend, GpuError, Result};

/// One buffered frame: recording resources plus the timeline value of the
/// last submission that used them.
#[derive(Debug)]
pub struct FrameSlot<R> {
    index: usize,
    recorder: R,
    last_submitted: TimelineValue,
}

impl<R> FrameSlot<R> {
    /// Position in the pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Value the slot's latest submission reaches on completion.
    #[must_use]
    pub const fn last_submitted(&self) -> TimelineValue {
        self.last_submitted
    }

    /// The slot's recorder.
    #[must_use]
    pub const fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Returns true while the GPU may still consume the slot's last submission.
    #[must_use]
    pub fn is_in_flight(&self, completed: TimelineValue) -> bool {
        !self.last_submitted.is_reached_by(completed)
    }
}

/// Fixed ring of frame slots, reused cyclically.
///
/// Slots are allocated once and reset, never destroyed, on reuse. The pool
/// never waits; the gate decides when a slot may be reset.
#[derive(Debug)]
pub struct FrameSlotPool<R> {
    slots: Vec<FrameSlot<R>>,
    cursor: usize,
}

impl<R> FrameSlotPool<R> {
    /// Create `count` slots with a recorder each.
    pub fn new<B>(backend: &mut B, count: usize) -> Result<Self>
    where
        B: GpuBackend<Recorder = R>,
    {
        if count == 0 {
            return Err(GpuError::InvalidState("frame pool needs at least one slot".to_string()));
        }
        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            match backend.create_recorder(index) {
                Ok(recorder) => slots.push(FrameSlot {
                    index,
                    recorder,
                    last_submitted: TimelineValue::ZERO,
                }),
                Err(e) => {
                    for slot in slots {
                        backend.destroy_recorder(slot.recorder);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            slots,
            // The first acquire lands on slot 0.
            cursor: count - 1,
        })
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the pool has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot most recently handed out.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Advance to the next slot and return its index.
    pub fn acquire(&mut self) -> usize {
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.cursor
    }

    /// Undo an acquire for a frame that failed before it was stamped.
    pub fn restore_cursor(&mut self, previous: usize) {
        debug_assert!(previous < self.slots.len());
        self.cursor = previous;
    }

    /// Make the next acquire return `image_index mod N`.
    pub fn resync(&mut self, image_index: usize) {
        let len = self.slots.len();
        self.cursor = (image_index % len + len - 1) % len;
    }

    /// Access a slot.
    pub fn slot(&self, index: usize) -> Result<&FrameSlot<R>> {
        self.slots
            .get(index)
            .ok_or_else(|| GpuError::InvalidState(format!("no frame slot {index}")))
    }

    /// Mutable access to a slot's recorder.
    pub fn recorder_mut(&mut self, index: usize) -> Result<&mut R> {
        self.slots
            .get_mut(index)
            .map(|slot| &mut slot.recorder)
            .ok_or_else(|| GpuError::InvalidState(format!("no frame slot {index}")))
    }

    /// Reset a slot's recorder for reuse.
    ///
    /// Fails with `ResourceBusy` if the GPU has not reached the slot's last
    /// submission.
    pub fn reset<B>(&mut self, backend: &mut B, index: usize, completed: TimelineValue) -> Result<()>
    where
        B: GpuBackend<Recorder = R>,
    {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| GpuError::InvalidState(format!("no frame slot {index}")))?;
        if slot.is_in_flight(completed) {
            return Err(GpuError::ResourceBusy(format!(
                "slot {index} still in flight: submitted {}, completed {completed}",
                slot.last_submitted
            )));
        }
        backend.reset_recorder(&mut slot.recorder)
    }

    /// Record the timeline value of a slot's new submission.
    pub fn stamp(&mut self, index: usize, value: TimelineValue) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| GpuError::InvalidState(format!("no frame slot {index}")))?;
        debug_assert!(value > slot.last_submitted, "slot stamped out of order");
        slot.last_submitted = value;
        Ok(())
    }

    /// Highest value any slot was stamped with.
    #[must_use]
    pub fn max_last_submitted(&self) -> TimelineValue {
        self.slots
            .iter()
            .map(FrameSlot::last_submitted)
            .max()
            .unwrap_or(TimelineValue::ZERO)
    }

    /// Number of slots whose last submission the GPU has not reached.
    #[must_use]
    pub fn in_flight(&self, completed: TimelineValue) -> usize {
        self.slots.iter().filter(|slot| slot.is_in_flight(completed)).count()
    }

    /// `last_submitted` of every slot, in slot order.
    #[must_use]
    pub fn last_submitted_values(&self) -> Vec<TimelineValue> {
        self.slots.iter().map(FrameSlot::last_submitted).collect()
    }

    /// Hand every recorder back to the backend. The slots must be idle.
    pub fn destroy<B>(self, backend: &mut B)
    where
        B: GpuBackend<Recorder = R>,
    {
        for slot in self.slots {
            backend.destroy_recorder(slot.recorder);
        }
    }
}
