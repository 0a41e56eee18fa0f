//! GPU context management.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::c_char;

use super::capabilities::DeviceCapabilities;
use super::instance::SelectedDevice;

/// Instance, device and the single queue the frame engine submits to.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) capabilities: DeviceCapabilities,
    pub(crate) queue_family: u32,
    pub(crate) queue: vk::Queue,
}

impl GpuContext {
    /// Create the logical device for a selected physical device.
    ///
    /// On failure the instance is handed back so the caller can tear down
    /// whatever still depends on it.
    ///
    /// # Safety
    /// The entry, instance and physical device must be valid.
    pub unsafe fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        selected: SelectedDevice,
    ) -> std::result::Result<Self, (GpuError, ash::Instance)> {
        let (device, queue) = match unsafe { create_device(&instance, &selected) } {
            Ok(created) => created,
            Err(e) => return Err((e, instance)),
        };

        tracing::info!("Selected GPU: {}", selected.capabilities.summary());

        Ok(Self {
            entry,
            instance,
            physical_device: selected.physical_device,
            device,
            capabilities: selected.capabilities,
            queue_family: selected.queue_family,
            queue,
        })
    }

    /// Get the Vulkan device handle.
    pub const fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get device capabilities.
    pub const fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Get the graphics/present queue.
    pub const fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the graphics/present queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Create the logical device with timeline semaphores and the swapchain
/// extension enabled.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    selected: &SelectedDevice,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(selected.queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extension_names: Vec<*const c_char> = vec![ash::khr::swapchain::NAME.as_ptr()];

    let mut vulkan_1_2_features =
        vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(selected.physical_device, &device_create_info, None) }
        .map_err(GpuError::from)?;
    let queue = unsafe { device.get_device_queue(selected.queue_family, 0) };

    Ok((device, queue))
}
