//! Presentation and swap-chain resize coordination.

use lockstep_core::{Extent2D, ResourceState};
use lockstep_gpu::{GpuBackend, GpuError, PresentParams, Result};

/// A swap-chain image handle and the state the recorded work leaves it in.
#[derive(Debug, Clone)]
pub struct RenderTarget<I> {
    handle: I,
    state: ResourceState,
}

impl<I> RenderTarget<I> {
    /// Backend image handle.
    #[must_use]
    pub const fn handle(&self) -> &I {
        &self.handle
    }

    /// Usage state at the end of the last submitted list.
    #[must_use]
    pub const fn state(&self) -> ResourceState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }
}

/// Whether the swap chain is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeState {
    Stable,
    /// Render targets are released while the swap chain is rebuilt.
    Resizing,
}

/// Owns the render targets and the present parameters.
#[derive(Debug)]
pub struct PresentCoordinator<I> {
    targets: Vec<RenderTarget<I>>,
    state: ResizeState,
    extent: Extent2D,
    vsync: bool,
    tearing_supported: bool,
}

impl<I> PresentCoordinator<I> {
    /// Take handles to every swap-chain image.
    pub fn new<B>(backend: &B, vsync: bool, tearing_supported: bool) -> Result<Self>
    where
        B: GpuBackend<Image = I>,
    {
        Ok(Self {
            targets: Self::acquire_targets(backend)?,
            state: ResizeState::Stable,
            extent: backend.extent(),
            vsync,
            tearing_supported,
        })
    }

    fn acquire_targets<B>(backend: &B) -> Result<Vec<RenderTarget<I>>>
    where
        B: GpuBackend<Image = I>,
    {
        (0..backend.image_count())
            .map(|index| {
                Ok(RenderTarget {
                    handle: backend.render_target(index)?,
                    state: ResourceState::Present,
                })
            })
            .collect()
    }

    /// Current swap-chain extent.
    #[must_use]
    pub const fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Resize state.
    #[must_use]
    pub const fn state(&self) -> ResizeState {
        self.state
    }

    /// Number of render targets held.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Render target for a swap-chain image.
    pub fn target(&self, index: usize) -> Result<&RenderTarget<I>> {
        self.targets
            .get(index)
            .ok_or_else(|| GpuError::InvalidState(format!("no render target {index}")))
    }

    pub(crate) fn target_mut(&mut self, index: usize) -> Result<&mut RenderTarget<I>> {
        self.targets
            .get_mut(index)
            .ok_or_else(|| GpuError::InvalidState(format!("no render target {index}")))
    }

    /// Vsync preference.
    #[must_use]
    pub const fn vsync(&self) -> bool {
        self.vsync
    }

    pub(crate) fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    /// Parameters for the next present.
    #[must_use]
    pub const fn present_params(&self) -> PresentParams {
        PresentParams::new(self.vsync, self.tearing_supported)
    }

    /// Release every render target and resize the swap chain.
    ///
    /// All work referencing the targets must have completed. The targets are
    /// reacquired even when the resize fails, so the coordinator always ends
    /// up `Stable` with handles matching the swap chain.
    pub fn resize<B>(&mut self, backend: &mut B, extent: Extent2D) -> Result<Extent2D>
    where
        B: GpuBackend<Image = I>,
    {
        self.state = ResizeState::Resizing;
        self.targets.clear();

        let resized = backend.resize_swapchain(extent.clamped());
        let reacquired = Self::acquire_targets(backend);
        self.state = ResizeState::Stable;
        self.extent = backend.extent();

        match reacquired {
            Ok(targets) => self.targets = targets,
            Err(e) => return Err(resized.err().unwrap_or(e)),
        }
        let applied = resized?;
        tracing::debug!("Render targets reacquired: {} at {applied}", self.targets.len());
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_gpu::{QueueMode, SoftDevice, SoftDeviceConfig};

    fn device() -> SoftDevice {
        SoftDevice::new(
            SoftDeviceConfig::default()
                .with_mode(QueueMode::Immediate)
                .with_extent(Extent2D::new(640, 480)),
        )
        .unwrap()
    }

    #[test]
    fn holds_one_target_per_image() {
        let device = device();
        let present = PresentCoordinator::new(&device, true, true).unwrap();
        assert_eq!(present.target_count(), 3);
        assert_eq!(present.extent(), Extent2D::new(640, 480));
        assert_eq!(present.target(0).unwrap().state(), ResourceState::Present);
        assert!(present.target(3).is_err());
    }

    #[test]
    fn resize_releases_handles_first() {
        let mut device = device();
        let mut present = PresentCoordinator::new(&device, true, false).unwrap();
        // The software swap chain refuses to resize while handles are held.
        let applied = present.resize(&mut device, Extent2D::new(0, 200)).unwrap();
        assert_eq!(applied, Extent2D::new(1, 200));
        assert_eq!(present.extent(), Extent2D::new(1, 200));
        assert_eq!(present.state(), ResizeState::Stable);
        assert_eq!(present.target(0).unwrap().handle().extent(), Extent2D::new(1, 200));
    }

    #[test]
    fn present_params_follow_vsync() {
        let device = device();
        let mut present = PresentCoordinator::new(&device, true, true).unwrap();
        assert_eq!(present.present_params().sync_interval, 1);
        present.set_vsync(false);
        assert!(present.present_params().allow_tearing);
    }
}
