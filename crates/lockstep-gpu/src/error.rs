//! GPU error types.

use ash::vk;
use lockstep_core::{Extent2D, TimelineValue};
use std::time::Duration;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Vulkan error without a more specific mapping.
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension or feature not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The swapchain no longer matches the surface and must be rebuilt.
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// A resource was reused while the GPU may still reference it.
    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    /// A wait exceeded its deadline.
    #[error("Timed out after {timeout:?} waiting for timeline value {value}")]
    TimedOut {
        /// Value that was not reached.
        value: TimelineValue,
        /// Budget that elapsed.
        timeout: Duration,
    },

    /// The device was lost. The whole GPU context must be recreated.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// The device or its surface was removed. The whole GPU context must be recreated.
    #[error("Device removed: {0}")]
    DeviceRemoved(String),

    /// Extent the backend cannot represent.
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(Extent2D),

    /// Commands referenced a render target in the wrong state.
    #[error("Invalid barrier: {0}")]
    InvalidBarrier(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Returns true for errors that end the GPU session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost(_) | Self::DeviceRemoved(_))
    }
}

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost(result.to_string()),
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::DeviceRemoved(result.to_string()),
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            other => Self::Vulkan(other),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
