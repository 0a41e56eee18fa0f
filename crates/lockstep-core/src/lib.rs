//! Core types and configuration for the Lockstep frame engine.
//!
//! This crate provides the vocabulary shared by the GPU backends, the frame
//! engine and the applications:
//! - Timeline values and resource states
//! - Swap-chain extents and clear colors
//! - Engine configuration and command-line parsing
//! - The windowed/fullscreen state machine

pub mod config;
pub mod error;
pub mod types;
pub mod window;

pub use config::{BackendKind, EngineConfig};
pub use error::{Error, Result};
pub use types::{ClearColor, Extent2D, ResourceState, TimelineValue};
pub use window::{WindowGeometry, WindowMode, WindowModeState, WindowStyle, WindowTransition};

/// Engine-wide constants
pub mod constants {
    /// Default number of frames the CPU may record ahead of the GPU
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;
    /// Upper bound on buffered frames
    pub const MAX_FRAMES_IN_FLIGHT: usize = 8;
    /// Default client width in pixels
    pub const DEFAULT_WIDTH: u32 = 1280;
    /// Default client height in pixels
    pub const DEFAULT_HEIGHT: u32 = 720;
}
