//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use lockstep_core::{EngineConfig, WindowModeState};
use lockstep_frame::FrameEngine;
use lockstep_gpu::GpuError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{ModifiersState, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::backend::WindowBackend;
use crate::color::ColorCycle;
use crate::input::{action_for_key, Action};
use crate::window::{apply_transition, current_geometry, monitor_geometry};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Engine settings; `width`/`height` size the window.
    pub engine: EngineConfig,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lockstep".to_string(),
            engine: EngineConfig::default(),
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Create a config from command-line arguments.
    ///
    /// Accepts everything [`EngineConfig::apply_args`] does, plus
    /// `--validation` and `--no-validation`.
    pub fn from_args<I, S>(title: impl Into<String>, args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let mut config = Self::new(title);
        config.engine = config.engine.apply_args(args.iter().map(|arg| arg.as_ref()))?;
        for arg in &args {
            match arg.as_ref() {
                "--validation" => config.validation = true,
                "--no-validation" => config.validation = false,
                _ => {}
            }
        }
        config.engine.validate()?;
        Ok(config)
    }

    /// Replace the engine settings.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it twice is harmless.
pub fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,lockstep_app=trace,lockstep_frame=trace,lockstep_gpu=trace")
        });
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .try_init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init();
    }
}

/// Open a window and render cleared frames on backend `B` until the window
/// closes, `Esc` is pressed or the configured frame count is reached.
pub fn run_app<B: WindowBackend + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<B> {
        config,
        state: None,
        failure: None,
    };
    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<B: WindowBackend> {
    config: AppConfig,
    state: Option<AppState<B>>,
    failure: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<B: WindowBackend> {
    // Dropped before the window it presents to.
    engine: FrameEngine<B>,
    window: Arc<Window>,
    config: AppConfig,
    window_mode: WindowModeState,
    modifiers: ModifiersState,
    colors: ColorCycle,
    minimized: bool,
    started: Instant,
    last_frame: Instant,
    min_fps: f64,
    max_fps: f64,
}

impl<B: WindowBackend + 'static> ApplicationHandler for AppRunner<B> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match AppState::create(&self.config, event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => match state.render_frame() {
                Ok(()) if state.frame_limit_reached() => {
                    info!("Frame limit reached");
                    self.shutdown(event_loop);
                }
                Ok(()) => {}
                Err(e) if state.engine.is_poisoned() => self.recover(event_loop, &e),
                Err(e) => {
                    error!("Render error: {e:#}");
                    self.failure = Some(e);
                    self.shutdown(event_loop);
                }
            },
            WindowEvent::Resized(size) => {
                if let Err(e) = state.handle_resize(size) {
                    error!("Resize error: {e:#}");
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                state.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                match action_for_key(key, state.modifiers) {
                    Some(Action::Quit) => {
                        info!("Escape pressed");
                        self.shutdown(event_loop);
                    }
                    Some(Action::ToggleVsync) => match state.engine.toggle_vsync() {
                        Ok(vsync) => info!("VSync {}", if vsync { "on" } else { "off" }),
                        Err(e) => error!("VSync toggle failed: {e}"),
                    },
                    Some(Action::ToggleFullscreen) => state.toggle_fullscreen(),
                    None => {}
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl<B: WindowBackend + 'static> AppRunner<B> {
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }

    fn recover(&mut self, event_loop: &ActiveEventLoop, cause: &anyhow::Error) {
        let Some(state) = self.state.take() else {
            return;
        };
        match state.recover(cause) {
            Ok(state) => self.state = Some(state),
            Err(e) => {
                error!("Failed to recover from device loss: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }
}

impl<B: WindowBackend> AppState<B> {
    fn create(config: &AppConfig, event_loop: &ActiveEventLoop) -> anyhow::Result<Self> {
        let extent = config.engine.extent();
        let window_attrs = Window::default_attributes()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(extent.width, extent.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let backend = B::create(&window, config)?;
        let engine = FrameEngine::new(backend, &config.engine)?;
        info!("Backend: {}", engine.info().name);

        let now = Instant::now();
        let mut state = Self {
            engine,
            window,
            config: config.clone(),
            window_mode: WindowModeState::new(),
            modifiers: ModifiersState::empty(),
            colors: ColorCycle::default(),
            minimized: false,
            started: now,
            last_frame: now,
            min_fps: f64::MAX,
            max_fps: 0.0,
        };
        if config.engine.fullscreen {
            state.toggle_fullscreen();
        }
        Ok(state)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        if self.minimized {
            return Ok(());
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;
        if dt > 0.0 {
            let fps = 1.0 / dt;
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
        }

        let color = self.colors.next().unwrap_or_default();
        match self.engine.render_frame(color) {
            Ok(_) => Ok(()),
            Err(e @ GpuError::TimedOut { .. }) => {
                warn!("Frame skipped: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the engine on a fresh backend after device loss.
    ///
    /// The old backend releases the window surface before the new one is
    /// created.
    fn recover(mut self, cause: &anyhow::Error) -> anyhow::Result<Self> {
        warn!("Recreating GPU backend after: {cause}");
        self.engine = self
            .engine
            .rebuild(|| B::create(&self.window, &self.config))?;
        Ok(self)
    }

    fn frame_limit_reached(&self) -> bool {
        self.config
            .engine
            .max_frames
            .is_some_and(|max| self.engine.stats().frames_rendered >= max)
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) -> anyhow::Result<()> {
        if size.width == 0 || size.height == 0 {
            if !self.minimized {
                info!("Window minimized, rendering paused");
            }
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;
        self.engine.on_resize(size.width, size.height)?;
        Ok(())
    }

    fn toggle_fullscreen(&mut self) {
        let current = current_geometry(&self.window);
        let monitor = monitor_geometry(&self.window);
        if let Some(transition) = self.window_mode.toggle(current, monitor) {
            apply_transition(&self.window, &transition);
        }
    }

    fn cleanup(&mut self) {
        let frames = self.engine.stats().frames_rendered;
        if frames > 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            #[allow(clippy::cast_precision_loss)]
            let avg = frames as f64 / elapsed.max(f64::EPSILON);
            info!("  Avg: {avg:.1}");
        }

        info!("Starting cleanup...");
        if let Err(e) = self.engine.shutdown() {
            error!("Failed to shut down frame engine: {e}");
        }
        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_args() {
        let config = AppConfig::from_args(
            "test",
            ["--width", "800", "--no-vsync", "--no-validation", "--fullscreen"],
        )
        .unwrap();
        assert_eq!(config.title, "test");
        assert_eq!(config.engine.width, 800);
        assert!(!config.engine.vsync);
        assert!(config.engine.fullscreen);
        assert!(!config.validation);
    }

    #[test]
    fn config_rejects_bad_numbers() {
        assert!(AppConfig::from_args("test", ["--height", "tall"]).is_err());
    }
}
