//! Application runner for the Lockstep frame engine.
//!
//! This crate hosts a [`FrameEngine`](lockstep_frame::FrameEngine) in a
//! winit window and handles the boilerplate around it:
//! - Logging initialization
//! - Window creation, minimize and resize handling
//! - Fullscreen toggling with windowed-geometry restore
//! - Keyboard bindings (`V` vsync, `Esc` quit, `Alt+Enter`/`F11` fullscreen)
//! - Recovery from device loss
//!
//! # Example
//!
//! ```no_run
//! use lockstep_app::{run_app, AppConfig};
//! use lockstep_gpu::VulkanBackend;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_args("Clear", std::env::args().skip(1))?;
//!     run_app::<VulkanBackend>(config)
//! }
//! ```

mod backend;
mod color;
mod input;
mod runner;
mod window;

pub use backend::WindowBackend;
pub use color::ColorCycle;
pub use input::{action_for_key, Action};
pub use runner::{init_logging, run_app, AppConfig};
pub use window::{apply_transition, current_geometry, monitor_geometry, style_from_flags};

pub use winit::keyboard::{KeyCode, ModifiersState};
