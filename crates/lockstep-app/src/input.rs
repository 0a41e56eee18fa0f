//! Keyboard bindings.

use winit::keyboard::{KeyCode, ModifiersState};

/// What a key press asks the runner to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ToggleVsync,
    ToggleFullscreen,
    Quit,
}

/// Map a key press to an action.
///
/// `Alt+Enter` and `F11` both toggle fullscreen; `F11` works with or
/// without `Alt`.
#[must_use]
pub fn action_for_key(key: KeyCode, modifiers: ModifiersState) -> Option<Action> {
    match key {
        KeyCode::KeyV => Some(Action::ToggleVsync),
        KeyCode::Escape => Some(Action::Quit),
        KeyCode::F11 => Some(Action::ToggleFullscreen),
        KeyCode::Enter | KeyCode::NumpadEnter if modifiers.alt_key() => {
            Some(Action::ToggleFullscreen)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullscreen_bindings() {
        let none = ModifiersState::empty();
        assert_eq!(
            action_for_key(KeyCode::Enter, ModifiersState::ALT),
            Some(Action::ToggleFullscreen)
        );
        assert_eq!(action_for_key(KeyCode::Enter, none), None);
        assert_eq!(action_for_key(KeyCode::F11, none), Some(Action::ToggleFullscreen));
        assert_eq!(
            action_for_key(KeyCode::F11, ModifiersState::ALT),
            Some(Action::ToggleFullscreen)
        );
    }

    #[test]
    fn vsync_and_quit() {
        let none = ModifiersState::empty();
        assert_eq!(action_for_key(KeyCode::KeyV, none), Some(Action::ToggleVsync));
        assert_eq!(action_for_key(KeyCode::Escape, none), Some(Action::Quit));
        assert_eq!(action_for_key(KeyCode::KeyX, none), None);
    }
}
