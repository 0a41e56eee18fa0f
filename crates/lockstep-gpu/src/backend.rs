//! The capability set every GPU backend provides.
//!
//! The frame engine is written once against [`GpuBackend`]. A backend owns its
//! device, queue and swap chain; per-slot recording resources and waitable
//! events are created by the backend but owned by the engine.

use lockstep_core::{ClearColor, Extent2D, ResourceState, TimelineValue};
use std::time::Duration;

use crate::error::Result;

/// Static facts about a backend, queried once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// Human-readable backend and adapter name.
    pub name: String,
    /// Presenting with tearing is supported (variable refresh rate displays).
    pub tearing_supported: bool,
    /// The present mode is baked into the swap chain, so toggling vsync
    /// requires rebuilding it.
    pub vsync_requires_rebuild: bool,
}

/// Parameters of a single present call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentParams {
    /// Number of vertical blanks to wait (0 or 1).
    pub sync_interval: u32,
    /// Present immediately even if it tears.
    pub allow_tearing: bool,
}

impl PresentParams {
    /// Derive present parameters from the vsync setting.
    ///
    /// Tearing is only requested when vsync is off and the backend supports it.
    #[must_use]
    pub const fn new(vsync: bool, tearing_supported: bool) -> Self {
        Self {
            sync_interval: if vsync { 1 } else { 0 },
            allow_tearing: tearing_supported && !vsync,
        }
    }
}

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The timeline reached the requested value.
    Ready,
    /// The deadline elapsed first.
    TimedOut,
}

/// A recorded GPU command.
///
/// Images are addressed by swap-chain image index; the backend maps them to
/// its native handles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Resource barrier moving an image between usage states.
    Transition {
        image: usize,
        from: ResourceState,
        to: ResourceState,
    },
    /// Clear the whole image to a color.
    Clear { image: usize, color: ClearColor },
}

/// The GPU capabilities the frame engine requires.
pub trait GpuBackend {
    /// Per-slot command allocator and command buffer.
    type Recorder;
    /// Handle to a swap-chain image. Holding one keeps the image referenced.
    type Image: Clone;
    /// Waitable handle used to block until a timeline value is reached.
    type Event;

    /// Static backend facts.
    fn info(&self) -> BackendInfo;

    /// Create the recording resources for one frame slot.
    fn create_recorder(&mut self, slot: usize) -> Result<Self::Recorder>;

    /// Destroy recording resources. The slot must be idle.
    fn destroy_recorder(&mut self, recorder: Self::Recorder);

    /// Create a waitable event.
    fn create_event(&mut self) -> Result<Self::Event>;

    /// Destroy a waitable event.
    fn destroy_event(&mut self, event: Self::Event);

    /// Return the recorder's allocator and command buffer to the initial state.
    fn reset_recorder(&mut self, recorder: &mut Self::Recorder) -> Result<()>;

    /// Obtain the swap-chain image index to render into this frame.
    fn acquire_image(&mut self, recorder: &Self::Recorder) -> Result<usize>;

    /// Number of swap-chain images.
    fn image_count(&self) -> usize;

    /// Index of the image the swap chain will hand out next.
    fn current_image_index(&self) -> usize;

    /// Handle to a swap-chain image.
    fn render_target(&self, index: usize) -> Result<Self::Image>;

    /// Current swap-chain extent.
    fn extent(&self) -> Extent2D;

    /// Close the recorder over `commands` and submit it to the queue.
    fn submit(
        &mut self,
        recorder: &mut Self::Recorder,
        image_index: usize,
        commands: &[Command],
    ) -> Result<()>;

    /// Queue presentation of an image.
    fn present(&mut self, image_index: usize, params: PresentParams) -> Result<()>;

    /// Ask the queue to mark `value` once all previously enqueued work completes.
    fn signal(&mut self, value: TimelineValue) -> Result<()>;

    /// Highest timeline value the GPU has reached.
    fn completed_value(&self) -> Result<TimelineValue>;

    /// Arm `event` for `value` and block on it for at most `timeout`.
    fn wait_event(
        &self,
        event: &Self::Event,
        value: TimelineValue,
        timeout: Duration,
    ) -> Result<WaitStatus>;

    /// Resize the swap chain's images. Every render target handle must have
    /// been released. Returns the extent actually applied.
    fn resize_swapchain(&mut self, extent: Extent2D) -> Result<Extent2D>;

    /// Record the vsync preference for subsequent presents.
    fn set_vsync(&mut self, vsync: bool);

    /// Returns true when the swap chain reported it no longer matches the surface.
    fn needs_rebuild(&self) -> bool {
        false
    }

    /// Block until the device has no outstanding work.
    fn wait_idle(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_present_params() {
        let params = PresentParams::new(true, true);
        assert_eq!(params.sync_interval, 1);
        assert!(!params.allow_tearing);
    }

    #[test]
    fn tearing_requires_support() {
        assert!(PresentParams::new(false, true).allow_tearing);
        assert!(!PresentParams::new(false, false).allow_tearing);
        assert_eq!(PresentParams::new(false, false).sync_interval, 0);
    }
}
