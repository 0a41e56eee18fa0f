//! Software GPU device.
//!
//! Models an explicit API built around a single 64-bit fence, an OS event set
//! on fence completion, per-frame command allocators and a flip-model swap
//! chain whose back buffers must all be released before a resize. It runs
//! anywhere, which makes it the reference backend for tests and the
//! equivalent of a software (WARP-style) adapter for the direct-style demo.

mod control;
mod fence;
mod queue;
mod swapchain;

pub use control::GpuControl;
pub use queue::{ExecStats, FaultPoint};
pub use swapchain::SoftImage;

use lockstep_core::{Extent2D, TimelineValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::backend::{BackendInfo, Command, GpuBackend, PresentParams, WaitStatus};
use crate::error::{GpuError, Result};
use crate::event::FenceEvent;
use queue::{QueueOp, Shared};
use swapchain::SoftSwapchain;

/// When queued work executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Work executes as it is enqueued; the GPU is never behind.
    Immediate,
    /// A queue thread executes work, sleeping `latency` per command list.
    Threaded { latency: Duration },
    /// Work is held until released through [`GpuControl`].
    Manual,
}

/// Software device configuration.
#[derive(Debug, Clone)]
pub struct SoftDeviceConfig {
    /// Number of swap-chain back buffers.
    pub image_count: usize,
    /// Initial back-buffer size.
    pub extent: Extent2D,
    /// Execution model.
    pub mode: QueueMode,
    /// Report support for tearing presents.
    pub tearing_supported: bool,
}

impl Default for SoftDeviceConfig {
    fn default() -> Self {
        Self {
            image_count: 3,
            extent: Extent2D::new(1280, 720),
            mode: QueueMode::Threaded {
                latency: Duration::from_millis(1),
            },
            tearing_supported: true,
        }
    }
}

impl SoftDeviceConfig {
    /// Set the back-buffer count.
    #[must_use]
    pub fn with_image_count(mut self, count: usize) -> Self {
        self.image_count = count;
        self
    }

    /// Set the initial back-buffer size.
    #[must_use]
    pub fn with_extent(mut self, extent: Extent2D) -> Self {
        self.extent = extent;
        self
    }

    /// Set the execution model.
    #[must_use]
    pub fn with_mode(mut self, mode: QueueMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set tearing support.
    #[must_use]
    pub fn with_tearing(mut self, supported: bool) -> Self {
        self.tearing_supported = supported;
        self
    }
}

/// Per-slot command allocator and list.
#[derive(Debug)]
pub struct SoftRecorder {
    slot: usize,
    commands: Vec<Command>,
    busy: Arc<AtomicBool>,
    resets: u64,
}

impl SoftRecorder {
    /// Slot this recorder belongs to.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Number of times the allocator was reset.
    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }

    /// Returns true while the GPU still executes the last submitted list.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

enum Dispatch {
    Immediate,
    Threaded {
        sender: crossbeam::channel::Sender<QueueOp>,
        worker: JoinHandle<()>,
    },
    Manual,
}

/// Software device with a fence, an event-driven wait and a flip swap chain.
pub struct SoftDevice {
    shared: Arc<Shared>,
    dispatch: Option<Dispatch>,
    swapchain: SoftSwapchain,
    tearing_supported: bool,
    vsync: bool,
}

impl SoftDevice {
    /// Create a device and, in threaded mode, start its queue thread.
    pub fn new(config: SoftDeviceConfig) -> Result<Self> {
        if config.image_count < 2 {
            return Err(GpuError::SwapchainCreation(format!(
                "flip swap chains need at least 2 buffers, got {}",
                config.image_count
            )));
        }
        let shared = Arc::new(Shared::default());

        let dispatch = match config.mode {
            QueueMode::Immediate => Dispatch::Immediate,
            QueueMode::Manual => Dispatch::Manual,
            QueueMode::Threaded { latency } => {
                let (sender, receiver) = crossbeam::channel::unbounded::<QueueOp>();
                let queue_shared = Arc::clone(&shared);
                let worker = thread::Builder::new()
                    .name("soft-gpu-queue".to_string())
                    .spawn(move || {
                        for op in receiver {
                            if matches!(op, QueueOp::Execute { .. }) && !latency.is_zero() {
                                thread::sleep(latency);
                            }
                            queue_shared.execute(op);
                        }
                    })
                    .map_err(|e| GpuError::Other(format!("Failed to spawn queue thread: {e}")))?;
                Dispatch::Threaded { sender, worker }
            }
        };

        tracing::info!(
            "Software device created: {} back buffers at {}, {:?}",
            config.image_count,
            config.extent,
            config.mode
        );

        Ok(Self {
            shared,
            dispatch: Some(dispatch),
            swapchain: SoftSwapchain::new(config.image_count, config.extent.clamped()),
            tearing_supported: config.tearing_supported,
            vsync: true,
        })
    }

    /// Handle for driving the queue and injecting faults.
    #[must_use]
    pub fn control(&self) -> GpuControl {
        GpuControl::new(Arc::clone(&self.shared))
    }

    /// Vsync preference last set.
    #[must_use]
    pub const fn vsync(&self) -> bool {
        self.vsync
    }

    fn enqueue(&self, op: QueueOp) -> Result<()> {
        match &self.dispatch {
            Some(Dispatch::Immediate) => self.shared.execute(op),
            Some(Dispatch::Threaded { sender, .. }) => sender
                .send(op)
                .map_err(|_| GpuError::DeviceLost("queue thread exited".to_string()))?,
            Some(Dispatch::Manual) => self.shared.push_pending(op),
            None => return Err(GpuError::InvalidState("device shut down".to_string())),
        }
        Ok(())
    }
}

impl GpuBackend for SoftDevice {
    type Recorder = SoftRecorder;
    type Image = Arc<SoftImage>;
    type Event = Arc<FenceEvent>;

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "Software device".to_string(),
            tearing_supported: self.tearing_supported,
            vsync_requires_rebuild: false,
        }
    }

    fn create_recorder(&mut self, slot: usize) -> Result<SoftRecorder> {
        Ok(SoftRecorder {
            slot,
            commands: Vec::with_capacity(8),
            busy: Arc::new(AtomicBool::new(false)),
            resets: 0,
        })
    }

    fn destroy_recorder(&mut self, recorder: SoftRecorder) {
        if recorder.is_busy() {
            tracing::warn!("Destroying recorder for slot {} while in use", recorder.slot);
        }
    }

    fn create_event(&mut self) -> Result<Arc<FenceEvent>> {
        Ok(Arc::new(FenceEvent::new()))
    }

    fn destroy_event(&mut self, _event: Arc<FenceEvent>) {}

    fn reset_recorder(&mut self, recorder: &mut SoftRecorder) -> Result<()> {
        if recorder.is_busy() {
            return Err(GpuError::ResourceBusy(format!(
                "command allocator for slot {} is still executing",
                recorder.slot
            )));
        }
        recorder.commands.clear();
        recorder.resets += 1;
        Ok(())
    }

    fn acquire_image(&mut self, _recorder: &SoftRecorder) -> Result<usize> {
        self.shared.check(FaultPoint::Acquire)?;
        Ok(self.swapchain.current())
    }

    fn image_count(&self) -> usize {
        self.swapchain.len()
    }

    fn current_image_index(&self) -> usize {
        self.swapchain.current()
    }

    fn render_target(&self, index: usize) -> Result<Arc<SoftImage>> {
        self.swapchain.image(index)
    }

    fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    fn submit(
        &mut self,
        recorder: &mut SoftRecorder,
        image_index: usize,
        commands: &[Command],
    ) -> Result<()> {
        self.shared.check(FaultPoint::Submit)?;
        if recorder.is_busy() {
            return Err(GpuError::ResourceBusy(format!(
                "command list for slot {} submitted twice",
                recorder.slot
            )));
        }
        let image = self.swapchain.image(image_index)?;
        recorder.commands.extend_from_slice(commands);
        recorder.busy.store(true, Ordering::Release);
        self.enqueue(QueueOp::Execute {
            image,
            commands: recorder.commands.clone(),
            busy: Arc::clone(&recorder.busy),
        })
    }

    fn present(&mut self, image_index: usize, params: PresentParams) -> Result<()> {
        self.shared.check(FaultPoint::Present)?;
        if image_index != self.swapchain.current() {
            return Err(GpuError::InvalidState(format!(
                "presenting back buffer {image_index} but {} is current",
                self.swapchain.current()
            )));
        }
        let image = self.swapchain.image(image_index)?;
        self.enqueue(QueueOp::Present { image, params })?;
        self.swapchain.rotate();
        Ok(())
    }

    fn signal(&mut self, value: TimelineValue) -> Result<()> {
        self.shared.check(FaultPoint::Signal)?;
        self.enqueue(QueueOp::Signal(value))
    }

    fn completed_value(&self) -> Result<TimelineValue> {
        Ok(self.shared.fence.completed())
    }

    fn wait_event(
        &self,
        event: &Arc<FenceEvent>,
        value: TimelineValue,
        timeout: Duration,
    ) -> Result<WaitStatus> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if value.is_reached_by(self.shared.fence.completed()) {
                return Ok(WaitStatus::Ready);
            }
            self.shared.fence.set_event_on_completion(value, event);
            let remaining = deadline.map_or(Duration::MAX, |d| {
                d.saturating_duration_since(Instant::now())
            });
            // A stale signal from an earlier registration can wake us early,
            // so the fence is re-checked on every wake-up.
            if !event.wait(remaining) {
                let reached = value.is_reached_by(self.shared.fence.completed());
                return Ok(if reached {
                    WaitStatus::Ready
                } else {
                    WaitStatus::TimedOut
                });
            }
        }
    }

    fn resize_swapchain(&mut self, extent: Extent2D) -> Result<Extent2D> {
        self.shared.check(FaultPoint::Resize)?;
        self.swapchain.resize(extent)?;
        tracing::debug!("Software swap chain resized to {extent}");
        Ok(extent)
    }

    fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    fn wait_idle(&mut self) -> Result<()> {
        match &self.dispatch {
            Some(Dispatch::Threaded { sender, .. }) => {
                let (done_tx, done_rx) = crossbeam::channel::bounded(1);
                sender
                    .send(QueueOp::Flush(done_tx))
                    .map_err(|_| GpuError::DeviceLost("queue thread exited".to_string()))?;
                done_rx
                    .recv()
                    .map_err(|_| GpuError::DeviceLost("queue thread exited".to_string()))?;
            }
            Some(Dispatch::Manual) => self.shared.wait_drained(),
            Some(Dispatch::Immediate) | None => {}
        }
        Ok(())
    }
}

impl Drop for SoftDevice {
    fn drop(&mut self) {
        if let Some(Dispatch::Threaded { sender, worker }) = self.dispatch.take() {
            // Closing the channel ends the queue thread after it drains.
            drop(sender);
            if worker.join().is_err() {
                tracing::error!("Software queue thread panicked");
            }
        }
        self.shared.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{ClearColor, ResourceState};

    fn device(mode: QueueMode) -> SoftDevice {
        SoftDevice::new(
            SoftDeviceConfig::default()
                .with_image_count(2)
                .with_extent(Extent2D::new(64, 64))
                .with_mode(mode),
        )
        .unwrap()
    }

    fn frame(image: usize) -> Vec<Command> {
        vec![
            Command::Transition {
                image,
                from: ResourceState::Present,
                to: ResourceState::RenderTarget,
            },
            Command::Clear {
                image,
                color: ClearColor::CORNFLOWER,
            },
            Command::Transition {
                image,
                from: ResourceState::RenderTarget,
                to: ResourceState::Present,
            },
        ]
    }

    #[test]
    fn rejects_single_buffer_swapchain() {
        let result = SoftDevice::new(SoftDeviceConfig::default().with_image_count(1));
        assert!(matches!(result, Err(GpuError::SwapchainCreation(_))));
    }

    #[test]
    fn immediate_mode_completes_on_signal() {
        let mut device = device(QueueMode::Immediate);
        let mut recorder = device.create_recorder(0).unwrap();
        let image = device.acquire_image(&recorder).unwrap();
        device.submit(&mut recorder, image, &frame(image)).unwrap();
        device.present(image, PresentParams::new(true, false)).unwrap();
        device.signal(TimelineValue::new(1)).unwrap();

        assert_eq!(device.completed_value().unwrap().get(), 1);
        assert!(!recorder.is_busy());
        assert_eq!(device.current_image_index(), 1);
        let stats = device.control().stats();
        assert_eq!(stats.barrier_violations, 0);
        assert_eq!(stats.presents, 1);
        assert_eq!(stats.last_clear, Some(ClearColor::CORNFLOWER));
    }

    #[test]
    fn busy_allocator_cannot_reset() {
        let mut device = device(QueueMode::Manual);
        let control = device.control();
        let mut recorder = device.create_recorder(0).unwrap();
        device.submit(&mut recorder, 0, &frame(0)).unwrap();

        let err = device.reset_recorder(&mut recorder).unwrap_err();
        assert!(matches!(err, GpuError::ResourceBusy(_)));

        control.complete_all();
        device.reset_recorder(&mut recorder).unwrap();
        assert_eq!(recorder.resets(), 1);
    }

    #[test]
    fn present_must_use_current_back_buffer() {
        let mut device = device(QueueMode::Immediate);
        let err = device.present(1, PresentParams::new(true, false)).unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
    }

    #[test]
    fn wait_event_times_out_then_succeeds() {
        let mut device = device(QueueMode::Manual);
        let control = device.control();
        let event = device.create_event().unwrap();
        device.signal(TimelineValue::new(1)).unwrap();

        let status = device
            .wait_event(&event, TimelineValue::new(1), Duration::from_millis(5))
            .unwrap();
        assert_eq!(status, WaitStatus::TimedOut);

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            control.complete_all();
        });
        let status = device
            .wait_event(&event, TimelineValue::new(1), Duration::MAX)
            .unwrap();
        assert_eq!(status, WaitStatus::Ready);
        releaser.join().unwrap();
    }

    #[test]
    fn threaded_wait_idle_drains_queue() {
        let mut device = device(QueueMode::Threaded {
            latency: Duration::from_millis(2),
        });
        let mut recorder = device.create_recorder(0).unwrap();
        device.submit(&mut recorder, 0, &frame(0)).unwrap();
        device.signal(TimelineValue::new(1)).unwrap();
        device.wait_idle().unwrap();
        assert_eq!(device.completed_value().unwrap().get(), 1);
        assert!(!recorder.is_busy());
    }

    #[test]
    fn resize_waits_for_held_back_buffers() {
        let mut device = device(QueueMode::Manual);
        let control = device.control();
        let mut recorder = device.create_recorder(0).unwrap();
        device.submit(&mut recorder, 0, &frame(0)).unwrap();

        // The queued list still references back buffer 0.
        let err = device.resize_swapchain(Extent2D::new(32, 32)).unwrap_err();
        assert!(matches!(err, GpuError::ResourceBusy(_)));

        control.complete_all();
        let applied = device.resize_swapchain(Extent2D::new(32, 32)).unwrap();
        assert_eq!(applied, Extent2D::new(32, 32));
        assert_eq!(device.extent(), Extent2D::new(32, 32));
    }

    #[test]
    fn device_lost_is_sticky() {
        let mut device = device(QueueMode::Immediate);
        let control = device.control();
        control.inject_fault(FaultPoint::Submit, GpuError::DeviceLost("hung".into()));
        let mut recorder = device.create_recorder(0).unwrap();

        assert!(device.submit(&mut recorder, 0, &frame(0)).unwrap_err().is_fatal());
        assert!(control.is_lost());
        assert!(device.signal(TimelineValue::new(1)).unwrap_err().is_fatal());
    }

    #[test]
    fn control_outlives_the_device() {
        let device = device(QueueMode::Threaded {
            latency: Duration::from_millis(1),
        });
        let control = device.control();
        assert!(!control.is_released());
        drop(device);
        assert!(control.is_released());
    }
}
