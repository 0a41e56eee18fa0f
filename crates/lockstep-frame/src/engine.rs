//! The frame engine.
//!
//! Drives one frame per [`FrameEngine::render_frame`] call through the
//! pipeline: acquire a slot, wait for the GPU to release it, reset it,
//! record the cleared frame, submit, present, signal and stamp. All
//! frame-lifecycle state lives here; the render loop owns the engine.

use lockstep_core::{ClearColor, EngineConfig, Extent2D, ResourceState, TimelineValue};
use lockstep_gpu::{BackendInfo, GpuBackend, GpuError, Result, SyncGate, Timeline, WaitStatus};
use std::fmt;
use std::time::Duration;

use crate::frame::FrameSlotPool;
use crate::present::PresentCoordinator;
use crate::recorder::CommandRecorder;

/// Outcome of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame slot used.
    pub slot: usize,
    /// Swap-chain image rendered to.
    pub image_index: usize,
    /// Timeline value the frame's work reaches on completion.
    pub value: TimelineValue,
    /// The CPU had to wait for the GPU to release the slot.
    pub blocked: bool,
    /// Time spent waiting.
    pub waited: Duration,
    /// False when the swap chain had to be rebuilt before anything was
    /// recorded; no slot state advanced and `value` is the last signaled one.
    pub presented: bool,
}

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    pub frames_blocked: u64,
    pub time_blocked: Duration,
    pub frames_skipped: u64,
    pub resizes: u64,
}

impl FrameStats {
    fn record(&mut self, report: &FrameReport) {
        self.frames_rendered += 1;
        if report.blocked {
            self.frames_blocked += 1;
            self.time_blocked += report.waited;
        }
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames rendered, {} blocked ({:.2} ms total), {} skipped, {} resizes",
            self.frames_rendered,
            self.frames_blocked,
            self.time_blocked.as_secs_f64() * 1000.0,
            self.frames_skipped,
            self.resizes
        )
    }
}

/// Per-backend frame resources, rebuilt on reinitialization.
struct FrameResources<B: GpuBackend> {
    timeline: Timeline,
    gate: SyncGate<B::Event>,
    pool: FrameSlotPool<B::Recorder>,
    present: PresentCoordinator<B::Image>,
}

impl<B: GpuBackend> FrameResources<B> {
    fn new(backend: &mut B, frames: usize, vsync: bool, tearing_supported: bool) -> Result<Self> {
        let gate = SyncGate::new(backend, frames)?;
        let pool = match FrameSlotPool::new(backend, frames) {
            Ok(pool) => pool,
            Err(e) => {
                gate.destroy(backend);
                return Err(e);
            }
        };
        let present = match PresentCoordinator::new(backend, vsync, tearing_supported) {
            Ok(present) => present,
            Err(e) => {
                pool.destroy(backend);
                gate.destroy(backend);
                return Err(e);
            }
        };
        Ok(Self {
            timeline: Timeline::new(),
            gate,
            pool,
            present,
        })
    }

    /// Run one frame, rolling the slot cursor back when it failed before
    /// its work was stamped.
    fn render(&mut self, backend: &mut B, color: ClearColor, timeout: Duration) -> Result<FrameReport> {
        let previous = self.pool.cursor();
        let signaled = self.timeline.last_signaled();
        let slot = self.pool.acquire();
        let result = self.submit_frame(backend, slot, color, timeout);
        if result.is_err() && self.timeline.last_signaled() == signaled {
            self.pool.restore_cursor(previous);
        }
        result
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn submit_frame(
        &mut self,
        backend: &mut B,
        slot: usize,
        color: ClearColor,
        timeout: Duration,
    ) -> Result<FrameReport> {
        let wait = self.gate.wait_until(backend, &self.timeline, slot, timeout)?;
        if wait.status == WaitStatus::TimedOut {
            return Err(GpuError::TimedOut {
                value: self.gate.point(slot).value(),
                timeout,
            });
        }

        let completed = self.timeline.completed_value(backend)?;
        self.pool.reset(backend, slot, completed)?;

        let image_index = backend.acquire_image(self.pool.slot(slot)?.recorder())?;
        let mut recorder =
            CommandRecorder::begin(image_index, self.present.target(image_index)?.state());
        recorder
            .transition(ResourceState::RenderTarget)?
            .clear(color)?
            .transition(ResourceState::Present)?;
        let list = recorder.finish()?;

        backend.submit(self.pool.recorder_mut(slot)?, image_index, list.commands())?;
        self.present
            .target_mut(image_index)?
            .set_state(ResourceState::Present);
        // The list is queued from here on: it is signaled and stamped even
        // when the present fails.
        let presented = backend.present(image_index, self.present.present_params());

        let value = match self.timeline.signal(backend) {
            Ok(value) => value,
            Err(e) => {
                if !e.is_fatal() {
                    if let Err(idle) = backend.wait_idle() {
                        tracing::warn!("Queue did not drain after a failed signal: {idle}");
                    }
                }
                return Err(e);
            }
        };
        self.pool.stamp(slot, value)?;
        self.gate.arm(slot, value);
        if let Err(e) = presented {
            tracing::debug!("Frame {value} stamped on slot {slot} but not presented: {e}");
            return Err(e);
        }

        tracing::trace!("Frame {value}: slot {slot}, image {image_index}");
        Ok(FrameReport {
            slot,
            image_index,
            value,
            blocked: wait.blocked,
            waited: wait.waited,
            presented: true,
        })
    }

    /// Report for a frame dropped because the swap chain was rebuilt.
    fn skipped_report(&self, backend: &B) -> FrameReport {
        FrameReport {
            slot: (self.pool.cursor() + 1) % self.pool.len(),
            image_index: backend.current_image_index(),
            value: self.timeline.last_signaled(),
            blocked: false,
            waited: Duration::ZERO,
            presented: false,
        }
    }

    /// Wait, without a deadline, for every submitted frame to complete.
    fn drain(&self, backend: &B) -> Result<()> {
        let target = self
            .pool
            .max_last_submitted()
            .max(self.timeline.last_signaled());
        self.gate.drain(backend, &self.timeline, target)?;
        debug_assert!(target.is_reached_by(self.timeline.last_observed()));
        Ok(())
    }

    /// Drain, release the render targets, resize and resync the slot cursor.
    fn resize(&mut self, backend: &mut B, extent: Extent2D) -> Result<Extent2D> {
        self.drain(backend)?;
        let applied = self.present.resize(backend, extent)?;
        self.pool.resync(backend.current_image_index());
        Ok(applied)
    }

    fn destroy(self, backend: &mut B) {
        self.pool.destroy(backend);
        self.gate.destroy(backend);
    }
}

/// Frame-lifecycle synchronization engine.
///
/// After a fatal error (`DeviceLost` or `DeviceRemoved`) every call fails
/// with `DeviceLost` until [`reinitialize`](Self::reinitialize) supplies a
/// fresh backend.
pub struct FrameEngine<B: GpuBackend> {
    backend: B,
    info: BackendInfo,
    frames: Option<FrameResources<B>>,
    frames_in_flight: usize,
    frame_timeout: Duration,
    vsync: bool,
    poisoned: Option<GpuError>,
    stats: FrameStats,
}

impl<B: GpuBackend> FrameEngine<B> {
    /// Create the engine and its per-slot resources on `backend`.
    pub fn new(backend: B, config: &EngineConfig) -> Result<Self> {
        let frames_in_flight = config.frame_count();
        if frames_in_flight != config.frames_in_flight {
            tracing::warn!(
                "frames_in_flight {} clamped to {frames_in_flight}",
                config.frames_in_flight
            );
        }
        Self::build(
            backend,
            frames_in_flight,
            config.frame_timeout(),
            config.vsync,
            FrameStats::default(),
        )
    }

    fn build(
        mut backend: B,
        frames_in_flight: usize,
        frame_timeout: Duration,
        vsync: bool,
        stats: FrameStats,
    ) -> Result<Self> {
        backend.set_vsync(vsync);
        let info = backend.info();
        if !info.tearing_supported {
            tracing::warn!("Tearing presents not supported by {}", info.name);
        }

        let frames =
            FrameResources::new(&mut backend, frames_in_flight, vsync, info.tearing_supported)?;
        tracing::info!(
            "Frame engine ready on {}: {frames_in_flight} frames in flight, {} images at {}",
            info.name,
            frames.present.target_count(),
            frames.present.extent()
        );

        Ok(Self {
            backend,
            info,
            frames: Some(frames),
            frames_in_flight,
            frame_timeout,
            vsync,
            poisoned: None,
            stats,
        })
    }

    fn ensure_usable(&self) -> Result<&FrameResources<B>> {
        if let Some(cause) = &self.poisoned {
            return Err(GpuError::DeviceLost(format!(
                "engine needs reinitialization after: {cause}"
            )));
        }
        self.frames
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("frame engine is shut down".to_string()))
    }

    fn poison_on_fatal<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.poisoned.is_none() {
                tracing::error!("Fatal GPU error, engine halted: {e}");
                self.poisoned = Some(e.clone());
            }
        }
        result
    }

    /// Render and present one frame cleared to `color`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn render_frame(&mut self, color: ClearColor) -> Result<FrameReport> {
        self.ensure_usable()?;
        let Some(frames) = self.frames.as_mut() else {
            return Err(GpuError::InvalidState("frame engine is shut down".to_string()));
        };

        let result = match frames.render(&mut self.backend, color, self.frame_timeout) {
            Err(GpuError::SwapchainOutOfDate) => {
                tracing::debug!("Swapchain out of date, rebuilding before the next frame");
                let extent = frames.present.extent();
                let rebuilt = frames.resize(&mut self.backend, extent);
                rebuilt.map(|_| {
                    self.stats.frames_skipped += 1;
                    frames.skipped_report(&self.backend)
                })
            }
            Ok(report) => {
                self.stats.record(&report);
                if self.backend.needs_rebuild() {
                    tracing::debug!("Swapchain suboptimal, rebuilding");
                    let extent = frames.present.extent();
                    frames.resize(&mut self.backend, extent).map(|_| report)
                } else {
                    Ok(report)
                }
            }
            Err(e) => Err(e),
        };
        self.poison_on_fatal(result)
    }

    /// Resize the swap chain to the new client size.
    ///
    /// Zero dimensions are clamped to 1. A request equal to the current
    /// extent does nothing.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        let requested = Extent2D::new(width, height);
        let extent = requested.clamped();
        if extent != requested {
            tracing::warn!("Resize to {requested} clamped to {extent}");
        }
        if self.ensure_usable()?.present.extent() == extent {
            tracing::debug!("Resize to current extent {extent} ignored");
            return Ok(());
        }
        let result = self.rebuild_swapchain(extent);
        if result.is_ok() {
            self.stats.resizes += 1;
        }
        result
    }

    fn rebuild_swapchain(&mut self, extent: Extent2D) -> Result<()> {
        let Some(frames) = self.frames.as_mut() else {
            return Err(GpuError::InvalidState("frame engine is shut down".to_string()));
        };
        let result = frames.resize(&mut self.backend, extent).map(|applied| {
            tracing::debug!("Swap chain resized to {applied}");
        });
        self.poison_on_fatal(result)
    }

    /// Change the vsync preference.
    ///
    /// Backends that bake the present mode into the swap chain rebuild it.
    pub fn set_vsync(&mut self, vsync: bool) -> Result<()> {
        self.ensure_usable()?;
        if vsync == self.vsync {
            return Ok(());
        }
        self.vsync = vsync;
        self.backend.set_vsync(vsync);
        if let Some(frames) = self.frames.as_mut() {
            frames.present.set_vsync(vsync);
        }
        tracing::info!("VSync {}", if vsync { "enabled" } else { "disabled" });

        if self.info.vsync_requires_rebuild {
            let extent = self.extent();
            self.rebuild_swapchain(extent)?;
        }
        Ok(())
    }

    /// Flip the vsync preference. Returns the new setting.
    pub fn toggle_vsync(&mut self) -> Result<bool> {
        let vsync = !self.vsync;
        self.set_vsync(vsync)?;
        Ok(vsync)
    }

    /// Flush the GPU and release every per-slot resource.
    ///
    /// Further frames fail until [`reinitialize`](Self::reinitialize).
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(frames) = self.frames.take() else {
            return Ok(());
        };
        let flushed = if self.poisoned.is_some() {
            Ok(())
        } else {
            frames.drain(&self.backend).and_then(|()| self.backend.wait_idle())
        };
        frames.destroy(&mut self.backend);
        tracing::info!("Frame engine shut down: {}", self.stats);
        flushed
    }

    /// Replace the backend after a fatal error and rebuild every resource.
    pub fn reinitialize(&mut self, backend: B) -> Result<()> {
        let mut old = std::mem::replace(&mut self.backend, backend);
        if let Some(frames) = self.frames.take() {
            if self.poisoned.is_none() {
                if let Err(e) = frames.drain(&old).and_then(|()| old.wait_idle()) {
                    tracing::warn!("Previous backend did not flush: {e}");
                }
            }
            frames.destroy(&mut old);
        }
        drop(old);

        self.backend.set_vsync(self.vsync);
        self.info = self.backend.info();
        self.frames = Some(FrameResources::new(
            &mut self.backend,
            self.frames_in_flight,
            self.vsync,
            self.info.tearing_supported,
        )?);
        self.poisoned = None;
        tracing::info!("Frame engine reinitialized on {}", self.info.name);
        Ok(())
    }

    /// Shut the engine down, drop its backend, then rebuild on the backend
    /// `create` returns.
    ///
    /// Unlike [`reinitialize`](Self::reinitialize) the old backend is gone
    /// before the new one is created, so both never hold the same window
    /// surface. Settings and counters carry over.
    pub fn rebuild<F, E>(mut self, create: F) -> std::result::Result<Self, E>
    where
        F: FnOnce() -> std::result::Result<B, E>,
        E: From<GpuError>,
    {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Previous backend did not flush: {e}");
        }
        let (frames_in_flight, frame_timeout, vsync, stats) =
            (self.frames_in_flight, self.frame_timeout, self.vsync, self.stats);
        drop(self);

        let engine = Self::build(create()?, frames_in_flight, frame_timeout, vsync, stats)?;
        tracing::info!("Frame engine rebuilt on {}", engine.info.name);
        Ok(engine)
    }

    /// The backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Backend facts queried at startup.
    pub const fn info(&self) -> &BackendInfo {
        &self.info
    }

    /// Counters so far.
    pub const fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Current vsync preference.
    pub const fn vsync(&self) -> bool {
        self.vsync
    }

    /// Number of frame slots (N).
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Returns true after a fatal error until reinitialized.
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Current swap-chain extent.
    pub fn extent(&self) -> Extent2D {
        self.frames
            .as_ref()
            .map_or_else(|| self.backend.extent(), |frames| frames.present.extent())
    }

    /// Slot the next frame will use.
    pub fn next_slot(&self) -> Option<usize> {
        self.frames
            .as_ref()
            .map(|frames| (frames.pool.cursor() + 1) % frames.pool.len())
    }

    /// `last_submitted` of every slot.
    pub fn slot_values(&self) -> Vec<TimelineValue> {
        self.frames
            .as_ref()
            .map(|frames| frames.pool.last_submitted_values())
            .unwrap_or_default()
    }

    /// Most recently signaled timeline value.
    pub fn last_signaled(&self) -> TimelineValue {
        self.frames
            .as_ref()
            .map_or(TimelineValue::ZERO, |frames| frames.timeline.last_signaled())
    }

    /// Highest timeline value the GPU has reached.
    pub fn completed_value(&self) -> Result<TimelineValue> {
        let frames = self.ensure_usable()?;
        frames.timeline.completed_value(&self.backend)
    }

    /// Number of slots the GPU is still consuming.
    pub fn in_flight(&self) -> Result<usize> {
        let frames = self.ensure_usable()?;
        let completed = frames.timeline.completed_value(&self.backend)?;
        Ok(frames.pool.in_flight(completed))
    }
}

impl<B: GpuBackend> Drop for FrameEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Frame engine shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_gpu::{FaultPoint, QueueMode, SoftDevice, SoftDeviceConfig};

    fn soft_engine(mode: QueueMode, frames: usize) -> FrameEngine<SoftDevice> {
        let device = SoftDevice::new(SoftDeviceConfig::default().with_mode(mode)).unwrap();
        FrameEngine::new(device, &EngineConfig::default().with_frames_in_flight(frames)).unwrap()
    }

    #[test]
    fn frames_are_stamped_in_order() {
        let mut engine = soft_engine(QueueMode::Immediate, 2);
        let values: Vec<_> = (0..4)
            .map(|_| engine.render_frame(ClearColor::BLACK).unwrap().value.get())
            .collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(engine.slot_values(), vec![TimelineValue::new(3), TimelineValue::new(4)]);
        assert_eq!(engine.stats().frames_rendered, 4);
    }

    #[test]
    fn frame_count_is_clamped() {
        let engine = soft_engine(QueueMode::Immediate, 0);
        assert_eq!(engine.frames_in_flight(), 1);
        let engine = soft_engine(QueueMode::Immediate, 64);
        assert_eq!(engine.frames_in_flight(), 8);
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut engine = soft_engine(QueueMode::Immediate, 3);
        engine.render_frame(ClearColor::BLACK).unwrap();
        engine
            .backend()
            .control()
            .inject_fault(FaultPoint::Acquire, GpuError::SwapchainOutOfDate);

        let report = engine.render_frame(ClearColor::BLACK).unwrap();
        assert!(!report.presented);
        assert_eq!(report.value, TimelineValue::new(1));
        assert_eq!(engine.stats().frames_skipped, 1);

        let report = engine.render_frame(ClearColor::BLACK).unwrap();
        assert!(report.presented);
        assert_eq!(report.value, TimelineValue::new(2));
    }

    #[test]
    fn vsync_toggle_changes_present_params() {
        let mut engine = soft_engine(QueueMode::Immediate, 2);
        assert!(!engine.toggle_vsync().unwrap());
        engine.render_frame(ClearColor::BLACK).unwrap();
        let present = engine.backend().control().stats().last_present.unwrap();
        assert_eq!(present.sync_interval, 0);
        assert!(present.allow_tearing);
        assert!(!engine.backend().vsync());
    }

    #[test]
    fn shutdown_is_idempotent_and_final() {
        let mut engine = soft_engine(QueueMode::Immediate, 2);
        engine.render_frame(ClearColor::BLACK).unwrap();
        engine.shutdown().unwrap();
        engine.shutdown().unwrap();
        assert!(matches!(
            engine.render_frame(ClearColor::BLACK),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn rebuild_releases_the_old_backend_first() {
        let mut engine = soft_engine(QueueMode::Immediate, 2);
        engine.render_frame(ClearColor::BLACK).unwrap();
        engine.set_vsync(false).unwrap();
        let old = engine.backend().control();
        old.inject_fault(FaultPoint::Present, GpuError::DeviceRemoved("reset".into()));
        assert!(engine.render_frame(ClearColor::BLACK).unwrap_err().is_fatal());
        assert!(engine.is_poisoned());

        let mut engine = engine
            .rebuild(|| {
                assert!(old.is_released());
                SoftDevice::new(SoftDeviceConfig::default())
            })
            .unwrap();
        assert!(!engine.is_poisoned());
        assert!(!engine.vsync());
        assert_eq!(engine.frames_in_flight(), 2);
        assert_eq!(engine.stats().frames_rendered, 1);

        let report = engine.render_frame(ClearColor::BLACK).unwrap();
        assert_eq!(report.slot, 0);
        assert_eq!(report.value, TimelineValue::new(1));
        assert_eq!(engine.stats().frames_rendered, 2);
    }
}
