//! Frame-lifecycle synchronization for the Lockstep engine.
//!
//! Keeps up to N frames of GPU work in flight without ever reusing a
//! frame's resources before the GPU has finished with them:
//! - [`FrameSlotPool`] owns the per-frame recording resources
//! - [`CommandRecorder`] brackets each frame's clear with validated barriers
//! - [`PresentCoordinator`] owns the render targets and handles resizes
//! - [`FrameEngine`] runs the whole pipeline once per frame
//!
//! # Example
//!
//! ```no_run
//! use lockstep_core::{ClearColor, EngineConfig};
//! use lockstep_frame::FrameEngine;
//! use lockstep_gpu::{SoftDevice, SoftDeviceConfig};
//!
//! fn main() -> Result<(), lockstep_gpu::GpuError> {
//!     let device = SoftDevice::new(SoftDeviceConfig::default())?;
//!     let mut engine = FrameEngine::new(device, &EngineConfig::default())?;
//!     for _ in 0..10 {
//!         engine.render_frame(ClearColor::CORNFLOWER)?;
//!     }
//!     engine.shutdown()
//! }
//! ```

mod engine;
mod frame;
mod present;
mod recorder;

pub use engine::{FrameEngine, FrameReport, FrameStats};
pub use frame::{FrameSlot, FrameSlotPool};
pub use present::{PresentCoordinator, RenderTarget, ResizeState};
pub use recorder::{CommandRecorder, RecordedList};
