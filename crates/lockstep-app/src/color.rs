//! Per-frame clear color animation.

use std::f32::consts::TAU;

use glam::Vec3;
use lockstep_core::ClearColor;

/// Phase offsets of the red, green and blue waves.
const CHANNEL_OFFSETS: Vec3 = Vec3::new(0.0, TAU / 3.0, 2.0 * TAU / 3.0);

/// Endless sequence of clear colors, one per frame, cycling through the hue
/// wheel.
#[derive(Debug, Clone)]
pub struct ColorCycle {
    phase: f32,
    step: f32,
}

impl Default for ColorCycle {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl ColorCycle {
    /// Create a cycle advancing `step` radians per frame.
    #[must_use]
    pub const fn new(step: f32) -> Self {
        Self { phase: 0.0, step }
    }

    /// Color for the current phase without advancing.
    #[must_use]
    pub fn current(&self) -> ClearColor {
        let angles = Vec3::splat(self.phase) + CHANNEL_OFFSETS;
        let wave = Vec3::new(angles.x.cos(), angles.y.cos(), angles.z.cos());
        let rgb = Vec3::splat(0.5) + 0.5 * wave;
        rgb.extend(1.0).into()
    }
}

impl Iterator for ColorCycle {
    type Item = ClearColor;

    fn next(&mut self) -> Option<ClearColor> {
        let color = self.current();
        self.phase = (self.phase + self.step) % TAU;
        Some(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_red_and_stays_in_range() {
        let mut cycle = ColorCycle::new(0.25);
        let first = cycle.next().unwrap();
        assert!((first.0[0] - 1.0).abs() < 1e-6);
        assert!(first.0[1] < 0.5 && first.0[2] < 0.5);

        for color in cycle.take(100) {
            assert!(color.0.iter().all(|c| (0.0..=1.0).contains(c)));
            assert!((color.0[3] - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn consecutive_colors_differ() {
        let mut cycle = ColorCycle::default();
        let a = cycle.next().unwrap();
        let b = cycle.next().unwrap();
        assert_ne!(a, b);
    }
}
