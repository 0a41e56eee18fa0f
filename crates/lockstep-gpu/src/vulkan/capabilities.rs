//! Physical device capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    #[must_use]
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// What a physical device offers the frame engine.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Timeline semaphores (VK 1.2 core feature)
    pub supports_timeline_semaphore: bool,
    /// `VK_KHR_swapchain` is available
    pub supports_swapchain: bool,
}

impl DeviceCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .unwrap_or_default();
        let available: HashSet<&CStr> = extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();

        let api_version = properties.api_version;
        let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default();
        if Self::version_at_least(api_version, 1, 2) {
            let mut features2 =
                vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_2_features);
            unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        }

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device_type: properties.device_type,
            api_version,
            supports_timeline_semaphore: vulkan_1_2_features.timeline_semaphore == vk::TRUE,
            supports_swapchain: available.contains(ash::khr::swapchain::NAME),
        }
    }

    const fn version_at_least(version: u32, major: u32, minor: u32) -> bool {
        let actual_major = vk::api_version_major(version);
        actual_major > major
            || (actual_major == major && vk::api_version_minor(version) >= minor)
    }

    /// Check if the device can drive the frame engine.
    #[must_use]
    pub const fn meets_requirements(&self) -> bool {
        Self::version_at_least(self.api_version, 1, 2)
            && self.supports_timeline_semaphore
            && self.supports_swapchain
    }

    /// Preference score; discrete GPUs first.
    #[must_use]
    pub const fn score(&self) -> i32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            _ => 1,
        }
    }

    /// Get a human-readable summary of capabilities.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: u32, timeline: bool) -> DeviceCapabilities {
        DeviceCapabilities {
            vendor: GpuVendor::from_vendor_id(0x1002),
            device_name: "Test GPU".to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version,
            supports_timeline_semaphore: timeline,
            supports_swapchain: true,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn requires_vulkan_1_2_with_timeline_semaphores() {
        assert!(caps(vk::API_VERSION_1_2, true).meets_requirements());
        assert!(caps(vk::API_VERSION_1_3, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_1, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_3, false).meets_requirements());
    }

    #[test]
    fn summary_names_device() {
        let summary = caps(vk::API_VERSION_1_2, true).summary();
        assert!(summary.starts_with("Test GPU (Amd) - Vulkan 1.2"));
    }
}
