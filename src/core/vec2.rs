//! 2D Vector
//!
//! Floating-point 2D vector used for positions, directions and velocities.
//! Screen coordinates: x grows to the right, y grows downward.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use serde::{Serialize, Deserialize};

/// 2D vector with `f64` components.
///
/// Serializes as `{"x":..,"y":..}`, which is the wire shape every record uses.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Vec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Unit vector pointing up the screen (-Y)
    pub const UP: Self = Self { x: 0.0, y: -1.0 };

    /// Unit vector pointing down the screen (+Y)
    pub const DOWN: Self = Self { x: 0.0, y: 1.0 };

    /// Unit vector pointing left (-X)
    pub const LEFT: Self = Self { x: -1.0, y: 0.0 };

    /// Unit vector pointing right (+X)
    pub const RIGHT: Self = Self { x: 1.0, y: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Add another vector.
    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Subtract another vector.
    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scale(self, scalar: f64) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Squared length (avoids sqrt - prefer this for comparisons).
    #[inline]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        self.sub(other).length()
    }

    /// Normalize to unit length.
    /// Returns ZERO if length is zero.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::ZERO;
        }
        self.scale(1.0 / len)
    }

    /// Dot product with another vector.
    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Flip the horizontal component.
    #[inline]
    pub fn flip_x(self) -> Self {
        Self { x: -self.x, y: self.y }
    }

    /// Flip the vertical component.
    #[inline]
    pub fn flip_y(self) -> Self {
        Self { x: self.x, y: -self.y }
    }

    /// Whether both components are finite numbers.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Vec2::add(self, other)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Vec2::sub(self, other)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self { x: -self.x, y: -self.y }
    }
}

impl fmt::Debug for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec2({:.2}, {:.2})", self.x, self.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, -4.0);

        assert_eq!(a + b, Vec2::new(4.0, -2.0));
        assert_eq!(b - a, Vec2::new(2.0, -6.0));
        assert_eq!(-a, Vec2::new(-1.0, -2.0));
    }

    #[test]
    fn test_length_and_distance() {
        let v = Vec2::new(3.0, 4.0);
        assert_eq!(v.length(), 5.0);
        assert_eq!(v.length_squared(), 25.0);
        assert_eq!(Vec2::ZERO.distance(v), 5.0);
    }

    #[test]
    fn test_normalize() {
        let n = Vec2::new(10.0, 0.0).normalize();
        assert_eq!(n, Vec2::RIGHT);

        let diag = Vec2::new(1.0, 1.0).normalize();
        assert!((diag.length() - 1.0).abs() < 1e-12);

        // Zero stays zero instead of producing NaN
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_dot() {
        assert_eq!(Vec2::UP.dot(Vec2::DOWN), -1.0);
        assert_eq!(Vec2::UP.dot(Vec2::RIGHT), 0.0);
    }

    #[test]
    fn test_flip() {
        let v = Vec2::new(2.0, -3.0);
        assert_eq!(v.flip_x(), Vec2::new(-2.0, -3.0));
        assert_eq!(v.flip_y(), Vec2::new(2.0, 3.0));
    }

    #[test]
    fn test_serializes_as_xy_object() {
        let json = serde_json::to_string(&Vec2::new(1.5, -2.0)).unwrap();
        assert_eq!(json, r#"{"x":1.5,"y":-2.0}"#);

        let back: Vec2 = serde_json::from_str(r#"{"x":3,"y":4}"#).unwrap();
        assert_eq!(back, Vec2::new(3.0, 4.0));
    }
}
