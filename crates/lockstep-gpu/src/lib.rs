//! GPU backends and synchronization primitives for the Lockstep frame engine.
//!
//! This crate provides:
//! - The [`GpuBackend`] capability trait the frame engine is written against
//! - The CPU-side view of the GPU timeline ([`Timeline`])
//! - The per-slot synchronization gate ([`SyncGate`])
//! - A software device modelled on fence/event explicit APIs ([`soft`])
//! - A Vulkan backend built on `ash` ([`vulkan`])

pub mod backend;
pub mod error;
pub mod event;
pub mod gate;
pub mod soft;
pub mod timeline;
pub mod vulkan;

pub use backend::{BackendInfo, Command, GpuBackend, PresentParams, WaitStatus};
pub use error::{GpuError, Result};
pub use event::FenceEvent;
pub use gate::{SyncGate, SyncPoint, WaitOutcome};
pub use soft::{FaultPoint, GpuControl, QueueMode, SoftDevice, SoftDeviceConfig};
pub use timeline::Timeline;
pub use vulkan::{VulkanBackend, VulkanBackendBuilder};
