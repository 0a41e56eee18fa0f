//! Software command queue and executor.
//!
//! Operations are executed strictly in submission order. The executor plays
//! the role of the GPU: it validates barrier state per image, records clears,
//! and advances the fence when it reaches a signal.

use lockstep_core::{ClearColor, ResourceState, TimelineValue};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::fence::SoftFence;
use super::swapchain::SoftImage;
use crate::backend::{Command, PresentParams};
use crate::error::{GpuError, Result};

/// Where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Acquire,
    Submit,
    Present,
    Signal,
    Resize,
}

/// Counters kept by the executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecStats {
    /// Command lists executed.
    pub lists_executed: u64,
    /// Presents executed.
    pub presents: u64,
    /// Signals executed.
    pub signals: u64,
    /// Commands that found an image in the wrong state.
    pub barrier_violations: u64,
    /// Color of the most recent clear.
    pub last_clear: Option<ClearColor>,
    /// Parameters of the most recent present.
    pub last_present: Option<PresentParams>,
}

pub(crate) enum QueueOp {
    Execute {
        image: Arc<SoftImage>,
        commands: Vec<Command>,
        busy: Arc<AtomicBool>,
    },
    Present {
        image: Arc<SoftImage>,
        params: PresentParams,
    },
    Signal(TimelineValue),
    Flush(crossbeam::channel::Sender<()>),
}

/// Operations held back until a test control releases them.
#[derive(Default)]
struct Held {
    ops: VecDeque<QueueOp>,
    executing: usize,
}

/// State shared between the device, its queue thread and test controls.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) fence: SoftFence,
    pending: Mutex<Held>,
    drained: Condvar,
    stats: Mutex<ExecStats>,
    faults: Mutex<Vec<(FaultPoint, GpuError)>>,
    lost: Mutex<Option<GpuError>>,
    released: AtomicBool,
}

impl Shared {
    /// Execute one queue operation.
    pub(crate) fn execute(&self, op: QueueOp) {
        match op {
            QueueOp::Execute {
                image,
                commands,
                busy,
            } => {
                let violations = commands
                    .iter()
                    .filter(|cmd| !Self::apply(&image, cmd))
                    .count() as u64;
                if violations > 0 {
                    tracing::warn!(
                        "Command list for back buffer {} had {violations} barrier violations",
                        image.index()
                    );
                }
                let mut stats = self.stats.lock();
                stats.lists_executed += 1;
                stats.barrier_violations += violations;
                if let Some(color) = image.last_clear() {
                    stats.last_clear = Some(color);
                }
                busy.store(false, Ordering::Release);
            }
            QueueOp::Present { image, params } => {
                let mut stats = self.stats.lock();
                if image.state() != ResourceState::Present {
                    tracing::warn!("Back buffer {} presented outside PRESENT state", image.index());
                    stats.barrier_violations += 1;
                }
                stats.presents += 1;
                stats.last_present = Some(params);
            }
            QueueOp::Signal(value) => {
                self.stats.lock().signals += 1;
                self.fence.complete(value);
            }
            QueueOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    /// Apply a command to its image. Returns false on a state mismatch.
    fn apply(image: &SoftImage, command: &Command) -> bool {
        match *command {
            Command::Transition { image: index, from, to } => {
                let valid = index == image.index() && image.state() == from;
                image.set_state(to);
                valid
            }
            Command::Clear { image: index, color } => {
                image.set_clear(color);
                index == image.index() && image.state() == ResourceState::RenderTarget
            }
        }
    }

    pub(crate) fn push_pending(&self, op: QueueOp) {
        self.pending.lock().ops.push_back(op);
    }

    /// Execute the oldest held operation. Returns false if none was held.
    pub(crate) fn execute_next(&self) -> bool {
        let op = {
            let mut held = self.pending.lock();
            let Some(op) = held.ops.pop_front() else {
                return false;
            };
            held.executing += 1;
            op
        };
        self.execute(op);
        let mut held = self.pending.lock();
        held.executing -= 1;
        if held.ops.is_empty() && held.executing == 0 {
            self.drained.notify_all();
        }
        true
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().ops.len()
    }

    /// Block until every held operation has executed.
    pub(crate) fn wait_drained(&self) {
        let mut held = self.pending.lock();
        while !(held.ops.is_empty() && held.executing == 0) {
            self.drained.wait(&mut held);
        }
    }

    pub(crate) fn stats(&self) -> ExecStats {
        self.stats.lock().clone()
    }

    pub(crate) fn inject_fault(&self, point: FaultPoint, error: GpuError) {
        self.faults.lock().push((point, error));
    }

    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn lost(&self) -> Option<GpuError> {
        self.lost.lock().clone()
    }

    /// Fail if the device is lost or a fault is armed at `point`.
    ///
    /// Injected faults fire once; a fatal one leaves the device lost.
    pub(crate) fn check(&self, point: FaultPoint) -> Result<()> {
        if let Some(lost) = self.lost() {
            return Err(lost);
        }
        let mut faults = self.faults.lock();
        let Some(pos) = faults.iter().position(|(p, _)| *p == point) else {
            return Ok(());
        };
        let (_, error) = faults.remove(pos);
        if error.is_fatal() {
            tracing::error!("Software device lost at {point:?}: {error}");
            *self.lost.lock() = Some(error.clone());
        }
        Err(error)
    }
}
