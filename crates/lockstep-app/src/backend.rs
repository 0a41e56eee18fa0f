//! Backends that can be created for a window.

use std::time::Duration;

use lockstep_core::Extent2D;
use lockstep_gpu::{GpuBackend, QueueMode, SoftDevice, SoftDeviceConfig, VulkanBackend, VulkanBackendBuilder};
use winit::window::Window;

use crate::runner::AppConfig;

/// A [`GpuBackend`] the runner can create for its window.
///
/// The runner keeps the window alive for as long as the backend exists.
pub trait WindowBackend: GpuBackend + Sized {
    /// Create the backend presenting to `window`.
    fn create(window: &Window, config: &AppConfig) -> anyhow::Result<Self>;
}

fn client_extent(window: &Window) -> Extent2D {
    let size = window.inner_size();
    Extent2D::new(size.width, size.height).clamped()
}

impl WindowBackend for VulkanBackend {
    fn create(window: &Window, config: &AppConfig) -> anyhow::Result<Self> {
        let backend = VulkanBackendBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .vsync(config.engine.vsync)
            .extent(client_extent(window))
            .build(window)?;
        Ok(backend)
    }
}

/// The software device renders off-screen; the window only supplies the size.
impl WindowBackend for SoftDevice {
    fn create(window: &Window, _config: &AppConfig) -> anyhow::Result<Self> {
        let device = SoftDevice::new(
            SoftDeviceConfig::default()
                .with_extent(client_extent(window))
                .with_mode(QueueMode::Threaded {
                    latency: Duration::from_millis(1),
                }),
        )?;
        Ok(device)
    }
}
