//! Lockstep direct clear
//!
//! Clears the swap chain of the software device to a cycling color every
//! frame. The device runs its queue on a worker thread, so the frame engine
//! throttles the CPU exactly as it would against a hardware queue.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lockstep-direct-clear -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::time::{Duration, Instant};

use anyhow::bail;
use lockstep_app::{init_logging, ColorCycle};
use lockstep_core::{BackendKind, EngineConfig};
use lockstep_frame::FrameEngine;
use lockstep_gpu::{QueueMode, SoftDevice, SoftDeviceConfig};
use tracing::{info, trace};

const DEFAULT_FRAMES: u64 = 300;
const QUEUE_LATENCY: Duration = Duration::from_millis(2);

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--help") {
        print_help();
        return Ok(());
    }

    init_logging();
    let config = EngineConfig::default().apply_args(std::env::args().skip(1))?;
    config.validate()?;
    if config.backend == BackendKind::Vulkan {
        info!("Hardware adapters are not used by this program, running on the software device");
    }

    let device = SoftDevice::new(
        SoftDeviceConfig::default()
            .with_extent(config.extent())
            .with_mode(QueueMode::Threaded {
                latency: QUEUE_LATENCY,
            }),
    )?;
    let mut engine = FrameEngine::new(device, &config)?;

    let frames = config.max_frames.unwrap_or(DEFAULT_FRAMES);
    let mut colors = ColorCycle::default();
    let started = Instant::now();
    for _ in 0..frames {
        let report = engine.render_frame(colors.next().unwrap_or_default())?;
        trace!(
            "slot {} image {} value {} waited {:?}",
            report.slot,
            report.image_index,
            report.value,
            report.waited
        );
    }
    let elapsed = started.elapsed();

    engine.shutdown()?;
    let executed = engine.backend().control().stats();
    info!(
        "{} presents in {:.2} s, {} lists executed",
        executed.presents,
        elapsed.as_secs_f64(),
        executed.lists_executed
    );
    if executed.barrier_violations > 0 {
        bail!("{} barrier violations reported by the device", executed.barrier_violations);
    }
    Ok(())
}

fn print_help() {
    eprintln!(
        "Lockstep direct clear

USAGE:
    cargo run -p lockstep-direct-clear -- [OPTIONS]

OPTIONS:
    -w, --width <PX>            Swap chain width (default: 1280)
    -h, --height <PX>           Swap chain height (default: 720)
    -n, --frames-in-flight <N>  Frames the CPU may run ahead, 1-8 (default: 3)
    --frames <COUNT>            Frames to render (default: 300)
    --timeout-ms <MS>           Give up waiting on a frame slot after MS
    --no-vsync                  Present with sync interval 0
    --warp                      Accepted for compatibility; always software
    --help                      Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                    Set log level (e.g., info, debug, trace)"
    );
}
