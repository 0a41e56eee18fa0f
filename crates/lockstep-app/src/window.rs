//! Applying window-mode transitions to a winit window.

use lockstep_core::{WindowGeometry, WindowMode, WindowStyle, WindowTransition};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::window::{Fullscreen, Window};

/// Style flags equivalent to a window's decoration state.
#[must_use]
pub fn style_from_flags(decorated: bool, resizable: bool) -> WindowStyle {
    let mut style = WindowStyle::OVERLAPPED;
    if !decorated {
        style.remove(
            WindowStyle::CAPTION
                | WindowStyle::SYS_MENU
                | WindowStyle::MINIMIZE_BOX
                | WindowStyle::MAXIMIZE_BOX,
        );
    }
    if !resizable {
        style.remove(WindowStyle::THICK_FRAME);
    }
    style
}

/// Saved rectangle: the outer position with the client size.
///
/// The size is restored through `request_inner_size`, so it is saved as the
/// client size rather than the outer size.
fn saved_geometry(
    outer_position: PhysicalPosition<i32>,
    inner_size: PhysicalSize<u32>,
) -> WindowGeometry {
    WindowGeometry::new(
        outer_position.x,
        outer_position.y,
        inner_size.width,
        inner_size.height,
    )
}

/// Outer position and client size that restore a saved rectangle.
const fn restore_request(geometry: WindowGeometry) -> (PhysicalPosition<i32>, PhysicalSize<u32>) {
    (
        PhysicalPosition::new(geometry.x, geometry.y),
        PhysicalSize::new(geometry.width, geometry.height),
    )
}

/// The window's rectangle and style.
#[must_use]
pub fn current_geometry(window: &Window) -> (WindowGeometry, WindowStyle) {
    let position = window.outer_position().unwrap_or_default();
    (
        saved_geometry(position, window.inner_size()),
        style_from_flags(window.is_decorated(), window.is_resizable()),
    )
}

/// Bounds of the monitor the window is on, or its own rectangle when the
/// platform cannot tell.
#[must_use]
pub fn monitor_geometry(window: &Window) -> WindowGeometry {
    window.current_monitor().map_or_else(
        || current_geometry(window).0,
        |monitor| {
            let position = monitor.position();
            let size = monitor.size();
            WindowGeometry::new(position.x, position.y, size.width, size.height)
        },
    )
}

/// Move the window into the state a transition describes.
///
/// The window system reports the new client size afterwards, which goes
/// through the regular resize path.
pub fn apply_transition(window: &Window, transition: &WindowTransition) {
    match transition.mode {
        WindowMode::Fullscreen => {
            window.set_fullscreen(Some(Fullscreen::Borderless(window.current_monitor())));
        }
        WindowMode::Windowed => {
            window.set_fullscreen(None);
            window.set_decorations(transition.style.is_decorated());
            window.set_resizable(transition.style.contains(WindowStyle::THICK_FRAME));
            let (position, size) = restore_request(transition.geometry);
            window.set_outer_position(position);
            // Best effort; the platform may pick another size.
            let _ = window.request_inner_size(size);
        }
    }
    tracing::info!(
        "Window mode {:?} at {}x{}",
        transition.mode,
        transition.geometry.width,
        transition.geometry.height
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorated_resizable_window_is_overlapped() {
        assert_eq!(style_from_flags(true, true), WindowStyle::OVERLAPPED);
    }

    #[test]
    fn undecorated_window_keeps_only_frame() {
        let style = style_from_flags(false, true);
        assert!(!style.is_decorated());
        assert_eq!(style, WindowStyle::THICK_FRAME);
        assert_eq!(style_from_flags(false, false), WindowStyle::borderless());
    }

    #[test]
    fn restored_size_is_the_saved_client_size() {
        let saved = saved_geometry(PhysicalPosition::new(40, 30), PhysicalSize::new(1280, 720));
        assert_eq!(saved, WindowGeometry::new(40, 30, 1280, 720));

        let (position, size) = restore_request(saved);
        assert_eq!(position, PhysicalPosition::new(40, 30));
        assert_eq!(size, PhysicalSize::new(1280, 720));
    }
}
