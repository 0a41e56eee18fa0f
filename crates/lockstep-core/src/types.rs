//! Value types shared across the engine.

use glam::Vec4;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the GPU timeline.
///
/// Every submission is stamped with a value strictly greater than all
/// previously assigned ones. Value zero is never assigned, so a slot that
/// was never submitted is always complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TimelineValue(u64);

impl TimelineValue {
    /// The initial value; reached before any work is submitted.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The value following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true if this value has been reached by `completed`.
    #[inline]
    #[must_use]
    pub const fn is_reached_by(self, completed: Self) -> bool {
        completed.0 >= self.0
    }
}

impl From<u64> for TimelineValue {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TimelineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Two-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    /// Create a new extent.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Swap chains cannot have zero-sized back buffers.
    #[inline]
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }

    /// Returns true if either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl fmt::Display for Extent2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Linear RGBA clear color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClearColor(pub [f32; 4]);

impl ClearColor {
    pub const BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);
    /// Default clear color.
    pub const CORNFLOWER: Self = Self([0.4, 0.6, 0.9, 1.0]);

    /// Create a color from components.
    #[inline]
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }

    /// Blend towards `other` by `t` in `[0, 1]`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Vec4::from(self).lerp(Vec4::from(other), t.clamp(0.0, 1.0)).into()
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::CORNFLOWER
    }
}

impl From<Vec4> for ClearColor {
    fn from(v: Vec4) -> Self {
        Self(v.to_array())
    }
}

impl From<ClearColor> for Vec4 {
    fn from(c: ClearColor) -> Self {
        Self::from_array(c.0)
    }
}

/// Usage state of a render target.
///
/// Backends translate these into their native resource states or image
/// layouts when recording barriers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    /// Owned by the presentation engine; may be presented.
    #[default]
    Present,
    /// Writable by clear and draw commands.
    RenderTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_zero_is_always_reached() {
        assert!(TimelineValue::ZERO.is_reached_by(TimelineValue::ZERO));
        assert!(!TimelineValue::new(3).is_reached_by(TimelineValue::new(2)));
        assert!(TimelineValue::new(3).is_reached_by(TimelineValue::new(3)));
    }

    #[test]
    fn timeline_next_is_strictly_greater() {
        let v = TimelineValue::new(41);
        assert!(v.next() > v);
        assert_eq!(v.next().get(), 42);
    }

    #[test]
    fn extent_clamps_to_one() {
        assert_eq!(Extent2D::new(0, 0).clamped(), Extent2D::new(1, 1));
        assert_eq!(Extent2D::new(0, 600).clamped(), Extent2D::new(1, 600));
        assert_eq!(Extent2D::new(800, 600).clamped(), Extent2D::new(800, 600));
        assert!(Extent2D::new(0, 5).is_degenerate());
    }

    #[test]
    fn clear_color_lerp_endpoints() {
        let a = ClearColor::BLACK;
        let b = ClearColor::rgba(1.0, 1.0, 1.0, 1.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5).0[0], 0.5);
    }
}
