//! External control over a software device's queue.

use lockstep_core::TimelineValue;
use std::sync::Arc;

use super::queue::{ExecStats, FaultPoint, Shared};
use crate::error::GpuError;

/// Handle for driving and inspecting a software device from another thread.
///
/// With [`QueueMode::Manual`](super::QueueMode::Manual) nothing executes until
/// released through this handle, which lets tests decide exactly when the
/// "GPU" catches up.
#[derive(Clone)]
pub struct GpuControl {
    shared: Arc<Shared>,
}

impl GpuControl {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Execute the oldest held operation. Returns false if none was held.
    pub fn complete_next(&self) -> bool {
        self.shared.execute_next()
    }

    /// Execute held operations until the fence reaches `value`.
    ///
    /// Returns the number of operations executed.
    pub fn complete_through(&self, value: TimelineValue) -> usize {
        let mut executed = 0;
        while !value.is_reached_by(self.completed_value()) && self.complete_next() {
            executed += 1;
        }
        executed
    }

    /// Execute every held operation.
    pub fn complete_all(&self) -> usize {
        let mut executed = 0;
        while self.complete_next() {
            executed += 1;
        }
        executed
    }

    /// Number of operations waiting to execute.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending_len()
    }

    /// Highest fence value executed so far.
    #[must_use]
    pub fn completed_value(&self) -> TimelineValue {
        self.shared.fence.completed()
    }

    /// Make the next call at `point` fail with `error`.
    ///
    /// `DeviceLost` and `DeviceRemoved` leave the device lost for good.
    pub fn inject_fault(&self, point: FaultPoint, error: GpuError) {
        self.shared.inject_fault(point, error);
    }

    /// Returns true once a fatal fault has fired.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.shared.lost().is_some()
    }

    /// Returns true once the device owning this queue has been dropped.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.shared.is_released()
    }

    /// Executor counters.
    #[must_use]
    pub fn stats(&self) -> ExecStats {
        self.shared.stats()
    }
}
