//! Lockstep Vulkan clear
//!
//! Opens a window and clears it to a cycling color every frame, keeping up
//! to N frames in flight.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lockstep-vk-clear -- [OPTIONS]
//! ```
//!
//! ## Keys
//!
//! - `V`: toggle vsync
//! - `Alt+Enter`, `F11`: toggle fullscreen
//! - `Esc`: quit
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use lockstep_app::{run_app, AppConfig};
use lockstep_core::BackendKind;
use lockstep_gpu::{SoftDevice, VulkanBackend};

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--help") {
        print_help();
        return Ok(());
    }

    let config = AppConfig::from_args("Lockstep - Vulkan Clear", std::env::args().skip(1))?;
    match config.engine.backend {
        BackendKind::Vulkan => run_app::<VulkanBackend>(config),
        BackendKind::Software => run_app::<SoftDevice>(config),
    }
}

fn print_help() {
    eprintln!(
        "Lockstep Vulkan clear

USAGE:
    cargo run -p lockstep-vk-clear -- [OPTIONS]

OPTIONS:
    -w, --width <PX>            Initial client width (default: 1280)
    -h, --height <PX>           Initial client height (default: 720)
    -n, --frames-in-flight <N>  Frames the CPU may run ahead, 1-8 (default: 3)
    --frames <COUNT>            Exit after COUNT frames
    --timeout-ms <MS>           Give up waiting on a frame slot after MS
    --no-vsync                  Present without waiting for vertical blank
    --fullscreen                Start fullscreen
    --warp                      Use the software device instead of Vulkan
    --validation                Enable Vulkan validation layers
    --no-validation             Disable Vulkan validation layers
    --help                      Print this help message

KEYS:
    V                           Toggle vsync
    Alt+Enter, F11              Toggle fullscreen
    Esc                         Quit

ENVIRONMENT VARIABLES:
    RUST_LOG                    Set log level (e.g., info, debug, trace)"
    );
}
