//! Flip-model software swap chain.

use lockstep_core::{ClearColor, Extent2D, ResourceState};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{GpuError, Result};

/// A software back buffer.
///
/// Tracks the usage state the executor last left it in and the last color it
/// was cleared to.
#[derive(Debug)]
pub struct SoftImage {
    index: usize,
    extent: Extent2D,
    state: Mutex<ResourceState>,
    last_clear: Mutex<Option<ClearColor>>,
}

impl SoftImage {
    fn new(index: usize, extent: Extent2D) -> Self {
        Self {
            index,
            extent,
            state: Mutex::new(ResourceState::Present),
            last_clear: Mutex::new(None),
        }
    }

    /// Position in the swap chain.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Size of the image.
    #[must_use]
    pub const fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Usage state as seen by the GPU timeline.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Color of the most recent clear.
    #[must_use]
    pub fn last_clear(&self) -> Option<ClearColor> {
        *self.last_clear.lock()
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }

    pub(crate) fn set_clear(&self, color: ClearColor) {
        *self.last_clear.lock() = Some(color);
    }
}

/// Rotating set of back buffers.
#[derive(Debug)]
pub(crate) struct SoftSwapchain {
    images: Vec<Arc<SoftImage>>,
    current: usize,
    extent: Extent2D,
}

impl SoftSwapchain {
    pub(crate) fn new(image_count: usize, extent: Extent2D) -> Self {
        Self {
            images: Self::create_images(image_count, extent),
            current: 0,
            extent,
        }
    }

    fn create_images(count: usize, extent: Extent2D) -> Vec<Arc<SoftImage>> {
        (0..count).map(|i| Arc::new(SoftImage::new(i, extent))).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.images.len()
    }

    pub(crate) const fn current(&self) -> usize {
        self.current
    }

    pub(crate) const fn extent(&self) -> Extent2D {
        self.extent
    }

    pub(crate) fn image(&self, index: usize) -> Result<Arc<SoftImage>> {
        self.images
            .get(index)
            .cloned()
            .ok_or_else(|| GpuError::InvalidState(format!("no back buffer {index}")))
    }

    /// Hand the current image to the display and move to the next one.
    pub(crate) fn rotate(&mut self) {
        self.current = (self.current + 1) % self.images.len();
    }

    /// Recreate the back buffers at a new size.
    ///
    /// Fails while any back buffer is referenced outside the swap chain, the
    /// same precondition a flip-model resize enforces.
    pub(crate) fn resize(&mut self, extent: Extent2D) -> Result<()> {
        if extent.is_degenerate() {
            return Err(GpuError::InvalidDimensions(extent));
        }
        if let Some(image) = self.images.iter().find(|img| Arc::strong_count(img) > 1) {
            return Err(GpuError::ResourceBusy(format!(
                "back buffer {} is still referenced",
                image.index()
            )));
        }
        let count = self.images.len();
        self.images = Self::create_images(count, extent);
        self.extent = extent;
        self.current = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_images() {
        let mut swapchain = SoftSwapchain::new(3, Extent2D::new(4, 4));
        let order: Vec<_> = (0..4)
            .map(|_| {
                let current = swapchain.current();
                swapchain.rotate();
                current
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2, 0]);
    }

    #[test]
    fn resize_rejects_referenced_images() {
        let mut swapchain = SoftSwapchain::new(2, Extent2D::new(4, 4));
        let held = swapchain.image(1).unwrap();
        let err = swapchain.resize(Extent2D::new(8, 8)).unwrap_err();
        assert!(matches!(err, GpuError::ResourceBusy(_)));

        drop(held);
        swapchain.resize(Extent2D::new(8, 8)).unwrap();
        assert_eq!(swapchain.extent(), Extent2D::new(8, 8));
        assert_eq!(swapchain.image(0).unwrap().extent(), Extent2D::new(8, 8));
    }

    #[test]
    fn resize_rejects_zero_extent() {
        let mut swapchain = SoftSwapchain::new(2, Extent2D::new(4, 4));
        assert!(matches!(
            swapchain.resize(Extent2D::new(0, 4)),
            Err(GpuError::InvalidDimensions(_))
        ));
    }
}
