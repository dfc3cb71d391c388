//! Math types.
//!
//! The arena is a flat 2D plane, so this stays deliberately small:
//! one vector type and the rounding helpers used on the wire.

use serde::{Deserialize, Serialize};

/// 2D vector in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn len_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn scale(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

/// Axis-aligned rectangle, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Rounds a world coordinate to the nearest whole unit.
pub fn round_coord(v: f64) -> i64 {
    v.round() as i64
}

/// Rounds an angle (radians) to two decimal places.
pub fn round_angle(a: f64) -> f64 {
    (a * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_idempotent() {
        for &a in &[0.0, 0.004, 0.005, -0.015, 1.234_567, -3.141_59, 6.283_185, 12.345] {
            let once = round_angle(a);
            assert_eq!(round_angle(once), once, "angle {a}");
        }
        for &x in &[0.49, 0.5, -0.5, 1.5, 2.5, -1024.7, 99_999.2] {
            let once = round_coord(x);
            assert_eq!(round_coord(once as f64), once, "coord {x}");
        }
    }

    #[test]
    fn round_coord_nearest() {
        assert_eq!(round_coord(10.4), 10);
        assert_eq!(round_coord(10.6), 11);
        assert_eq!(round_coord(-10.6), -11);
    }

    #[test]
    fn rect_contains_edges() {
        let r = Rect::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        assert!(r.contains(Vec2::new(1.0, -1.0)));
        assert!(!r.contains(Vec2::new(1.01, 0.0)));
    }
}
