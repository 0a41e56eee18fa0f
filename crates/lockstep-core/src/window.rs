//! Windowed/fullscreen state machine.
//!
//! Fullscreen is a borderless window covering the nearest monitor. Entering
//! it saves the windowed rectangle and style so leaving can restore them.
//! This state has no interaction with frame synchronization; the resize the
//! window system reports afterwards goes through the normal resize path.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Window decoration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowStyle: u8 {
        /// Title bar.
        const CAPTION      = 0b0000_0001;
        /// System menu / close button.
        const SYS_MENU     = 0b0000_0010;
        /// Resizable frame.
        const THICK_FRAME  = 0b0000_0100;
        /// Minimize button.
        const MINIMIZE_BOX = 0b0000_1000;
        /// Maximize button.
        const MAXIMIZE_BOX = 0b0001_0000;
        /// Standard decorated window.
        const OVERLAPPED = Self::CAPTION.bits()
            | Self::SYS_MENU.bits()
            | Self::THICK_FRAME.bits()
            | Self::MINIMIZE_BOX.bits()
            | Self::MAXIMIZE_BOX.bits();
    }
}

impl WindowStyle {
    /// Borderless style used while fullscreen.
    #[must_use]
    pub const fn borderless() -> Self {
        Self::empty()
    }

    /// Returns true if the window shows decorations.
    #[inline]
    #[must_use]
    pub const fn is_decorated(self) -> bool {
        self.contains(Self::CAPTION)
    }
}

/// Outer window rectangle in physical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry {
    /// Create a geometry.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Current presentation mode of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowMode {
    #[default]
    Windowed,
    Fullscreen,
}

/// Geometry and style to apply after a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTransition {
    /// Mode after the transition.
    pub mode: WindowMode,
    /// Rectangle the window must occupy.
    pub geometry: WindowGeometry,
    /// Decorations the window must carry.
    pub style: WindowStyle,
}

/// Tracks the window mode and the windowed state to restore.
#[derive(Debug, Clone)]
pub struct WindowModeState {
    mode: WindowMode,
    saved_geometry: Option<WindowGeometry>,
    saved_style: WindowStyle,
}

impl Default for WindowModeState {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowModeState {
    /// Create a state machine in windowed mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: WindowMode::Windowed,
            saved_geometry: None,
            saved_style: WindowStyle::OVERLAPPED,
        }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> WindowMode {
        self.mode
    }

    /// Returns true when fullscreen.
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.mode == WindowMode::Fullscreen
    }

    /// Geometry saved when fullscreen was entered.
    #[must_use]
    pub const fn saved_geometry(&self) -> Option<WindowGeometry> {
        self.saved_geometry
    }

    /// Request a mode. Returns `None` when already in that mode.
    ///
    /// * `current` - The window's present outer rectangle and style.
    /// * `monitor` - Bounds of the monitor nearest to the window.
    pub fn set_fullscreen(
        &mut self,
        fullscreen: bool,
        current: (WindowGeometry, WindowStyle),
        monitor: WindowGeometry,
    ) -> Option<WindowTransition> {
        match (self.mode, fullscreen) {
            (WindowMode::Windowed, true) => {
                self.saved_geometry = Some(current.0);
                self.saved_style = current.1;
                self.mode = WindowMode::Fullscreen;
                Some(WindowTransition {
                    mode: WindowMode::Fullscreen,
                    geometry: monitor,
                    style: WindowStyle::borderless(),
                })
            }
            (WindowMode::Fullscreen, false) => {
                self.mode = WindowMode::Windowed;
                let geometry = self.saved_geometry.take().unwrap_or(current.0);
                Some(WindowTransition {
                    mode: WindowMode::Windowed,
                    geometry,
                    style: self.saved_style,
                })
            }
            _ => None,
        }
    }

    /// Flip between windowed and fullscreen.
    pub fn toggle(
        &mut self,
        current: (WindowGeometry, WindowStyle),
        monitor: WindowGeometry,
    ) -> Option<WindowTransition> {
        let target = !self.is_fullscreen();
        self.set_fullscreen(target, current, monitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: WindowGeometry = WindowGeometry::new(100, 80, 1280, 720);
    const MONITOR: WindowGeometry = WindowGeometry::new(0, 0, 2560, 1440);

    #[test]
    fn enter_and_restore() {
        let mut state = WindowModeState::new();

        let enter = state
            .toggle((WINDOW, WindowStyle::OVERLAPPED), MONITOR)
            .unwrap();
        assert_eq!(enter.mode, WindowMode::Fullscreen);
        assert_eq!(enter.geometry, MONITOR);
        assert!(!enter.style.is_decorated());
        assert_eq!(state.saved_geometry(), Some(WINDOW));

        let leave = state
            .toggle((MONITOR, WindowStyle::borderless()), MONITOR)
            .unwrap();
        assert_eq!(leave.mode, WindowMode::Windowed);
        assert_eq!(leave.geometry, WINDOW);
        assert_eq!(leave.style, WindowStyle::OVERLAPPED);
        assert!(!state.is_fullscreen());
    }

    #[test]
    fn repeated_request_is_noop() {
        let mut state = WindowModeState::new();
        assert!(state
            .set_fullscreen(false, (WINDOW, WindowStyle::OVERLAPPED), MONITOR)
            .is_none());
        assert!(state
            .set_fullscreen(true, (WINDOW, WindowStyle::OVERLAPPED), MONITOR)
            .is_some());
        assert!(state
            .set_fullscreen(true, (MONITOR, WindowStyle::borderless()), MONITOR)
            .is_none());
    }

    #[test]
    fn custom_style_is_restored() {
        let mut state = WindowModeState::new();
        let style = WindowStyle::CAPTION | WindowStyle::SYS_MENU;
        state.toggle((WINDOW, style), MONITOR);
        let leave = state.toggle((MONITOR, WindowStyle::borderless()), MONITOR).unwrap();
        assert_eq!(leave.style, style);
    }
}
