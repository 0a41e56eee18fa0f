//! Command recording with barrier validation.

use lockstep_core::{ClearColor, ResourceState};
use lockstep_gpu::{Command, GpuError, Result};

/// Records the commands of one frame against one render target.
///
/// Tracks the target's state as commands are recorded. Clears are only
/// accepted while the target is a render target, and the list can only be
/// closed once the target is back in the present state.
#[derive(Debug)]
pub struct CommandRecorder {
    image: usize,
    state: ResourceState,
    commands: Vec<Command>,
}

impl CommandRecorder {
    /// Start recording for swap-chain image `image`, currently in `state`.
    #[must_use]
    pub fn begin(image: usize, state: ResourceState) -> Self {
        Self {
            image,
            state,
            commands: Vec::with_capacity(3),
        }
    }

    /// State the target will be in after the commands recorded so far.
    #[must_use]
    pub const fn state(&self) -> ResourceState {
        self.state
    }

    /// Record a barrier moving the target to `to`.
    pub fn transition(&mut self, to: ResourceState) -> Result<&mut Self> {
        if self.state == to {
            return Err(GpuError::InvalidBarrier(format!(
                "image {} is already in {to:?}",
                self.image
            )));
        }
        self.commands.push(Command::Transition {
            image: self.image,
            from: self.state,
            to,
        });
        self.state = to;
        Ok(self)
    }

    /// Record a full-target clear.
    pub fn clear(&mut self, color: ClearColor) -> Result<&mut Self> {
        if self.state != ResourceState::RenderTarget {
            return Err(GpuError::InvalidBarrier(format!(
                "clear of image {} in {:?}",
                self.image, self.state
            )));
        }
        self.commands.push(Command::Clear {
            image: self.image,
            color,
        });
        Ok(self)
    }

    /// Close the list.
    pub fn finish(self) -> Result<RecordedList> {
        if self.state != ResourceState::Present {
            return Err(GpuError::InvalidBarrier(format!(
                "list closed with image {} in {:?}",
                self.image, self.state
            )));
        }
        Ok(RecordedList {
            image: self.image,
            commands: self.commands,
        })
    }
}

/// A closed command list, ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedList {
    image: usize,
    commands: Vec<Command>,
}

impl RecordedList {
    /// Swap-chain image the list renders to.
    #[must_use]
    pub const fn image(&self) -> usize {
        self.image
    }

    /// The recorded commands.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_clear() {
        let mut recorder = CommandRecorder::begin(1, ResourceState::Present);
        recorder
            .transition(ResourceState::RenderTarget)
            .and_then(|r| r.clear(ClearColor::BLACK))
            .and_then(|r| r.transition(ResourceState::Present))
            .unwrap();
        let list = recorder.finish().unwrap();

        assert_eq!(list.image(), 1);
        assert_eq!(list.commands().len(), 3);
        assert_eq!(
            list.commands()[1],
            Command::Clear {
                image: 1,
                color: ClearColor::BLACK
            }
        );
    }

    #[test]
    fn clear_outside_render_target_is_rejected() {
        let mut recorder = CommandRecorder::begin(0, ResourceState::Present);
        let err = recorder.clear(ClearColor::BLACK).unwrap_err();
        assert!(matches!(err, GpuError::InvalidBarrier(_)));
    }

    #[test]
    fn list_must_end_in_present() {
        let mut recorder = CommandRecorder::begin(0, ResourceState::Present);
        recorder.transition(ResourceState::RenderTarget).unwrap();
        assert!(matches!(recorder.finish(), Err(GpuError::InvalidBarrier(_))));
    }

    #[test]
    fn redundant_transition_is_rejected() {
        let mut recorder = CommandRecorder::begin(0, ResourceState::Present);
        assert!(recorder.transition(ResourceState::Present).is_err());
        assert_eq!(recorder.state(), ResourceState::Present);
    }
}
