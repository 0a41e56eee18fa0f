//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_FRAMES_IN_FLIGHT, DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_FRAMES_IN_FLIGHT};
use crate::error::{Error, Result};
use crate::types::Extent2D;

/// Which GPU backend drives the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Vulkan through `ash`.
    #[default]
    Vulkan,
    /// The software device (the equivalent of a WARP adapter).
    Software,
}

/// Startup configuration of the frame engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of buffered frames (N).
    pub frames_in_flight: usize,
    /// Present synchronized to vertical blank.
    pub vsync: bool,
    /// Start in borderless fullscreen.
    pub fullscreen: bool,
    /// Initial client width.
    pub width: u32,
    /// Initial client height.
    pub height: u32,
    /// Per-frame wait budget in milliseconds (None waits forever).
    pub frame_timeout_ms: Option<u64>,
    /// Backend selection.
    pub backend: BackendKind,
    /// Stop after this many frames (None runs until closed).
    pub max_frames: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            vsync: true,
            fullscreen: false,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_timeout_ms: None,
            backend: BackendKind::default(),
            max_frames: None,
        }
    }
}

impl EngineConfig {
    /// Set the number of frames in flight.
    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Start fullscreen.
    #[must_use]
    pub fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    /// Set the initial client size.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the per-frame wait budget.
    #[must_use]
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Select the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Stop after a fixed number of frames.
    #[must_use]
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Buffered frame count clamped to the supported range.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    /// Initial extent with zero dimensions clamped.
    #[must_use]
    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height).clamped()
    }

    /// Per-frame wait budget.
    #[must_use]
    pub fn frame_timeout(&self) -> Duration {
        self.frame_timeout_ms.map_or(Duration::MAX, Duration::from_millis)
    }

    /// Check the configuration, warning about values that will be clamped.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            tracing::warn!(
                "frames_in_flight = {} out of range, using {}",
                self.frames_in_flight,
                self.frame_count()
            );
        }
        if self.frame_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "frame timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply command-line arguments on top of this configuration.
    ///
    /// Recognized:
    /// - `-w, --width <PX>` and `-h, --height <PX>`
    /// - `-n, --frames-in-flight <N>`
    /// - `--no-vsync`, `--vsync`
    /// - `--fullscreen`
    /// - `--warp` (software backend)
    /// - `--frames <COUNT>`
    /// - `--timeout-ms <MS>`
    ///
    /// Unknown arguments are ignored so applications can layer their own.
    pub fn apply_args<I, S>(mut self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "-w" | "--width" => self.width = parse_value(arg.as_ref(), args.next())?,
                "-h" | "--height" => self.height = parse_value(arg.as_ref(), args.next())?,
                "-n" | "--frames-in-flight" => {
                    self.frames_in_flight = parse_value(arg.as_ref(), args.next())?;
                }
                "--frames" => self.max_frames = Some(parse_value(arg.as_ref(), args.next())?),
                "--timeout-ms" => {
                    self.frame_timeout_ms = Some(parse_value(arg.as_ref(), args.next())?);
                }
                "--no-vsync" => self.vsync = false,
                "--vsync" => self.vsync = true,
                "--fullscreen" => self.fullscreen = true,
                "-warp" | "--warp" => self.backend = BackendKind::Software,
                _ => {}
            }
        }
        Ok(self)
    }
}

fn parse_value<T, S>(name: &str, value: Option<S>) -> Result<T>
where
    T: std::str::FromStr,
    S: AsRef<str>,
{
    let value = value.ok_or_else(|| Error::MissingArgument(name.to_string()))?;
    value
        .as_ref()
        .parse()
        .map_err(|_| Error::InvalidArgument {
            name: name.to_string(),
            value: value.as_ref().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.frame_count(), 3);
        assert!(config.vsync);
        assert!(!config.fullscreen);
        assert_eq!(config.frame_timeout(), Duration::MAX);
    }

    #[test]
    fn frame_count_is_clamped() {
        assert_eq!(EngineConfig::default().with_frames_in_flight(0).frame_count(), 1);
        assert_eq!(EngineConfig::default().with_frames_in_flight(64).frame_count(), 8);
    }

    #[test]
    fn parses_size_and_flags() {
        let config = EngineConfig::default()
            .apply_args(["-w", "640", "--height", "480", "--no-vsync", "--warp", "--frames", "10"])
            .unwrap();
        assert_eq!(config.extent(), Extent2D::new(640, 480));
        assert!(!config.vsync);
        assert_eq!(config.backend, BackendKind::Software);
        assert_eq!(config.max_frames, Some(10));
    }

    #[test]
    fn ignores_unknown_arguments() {
        let config = EngineConfig::default()
            .apply_args(["--screenshot", "-n", "2"])
            .unwrap();
        assert_eq!(config.frame_count(), 2);
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = EngineConfig::default().apply_args(["--width"]).unwrap_err();
        assert!(matches!(err, Error::MissingArgument(_)));
    }

    #[test]
    fn bad_value_is_an_error() {
        let err = EngineConfig::default().apply_args(["-w", "wide"]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = EngineConfig::default().with_frame_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
