//! Geometry Utilities
//!
//! Pure collision primitives: axis-aligned boxes with inflatable margins,
//! ray–circle intersection, and universe bounds with boundary warping.

use serde::{Serialize, Deserialize};

use super::vec2::Vec2;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner (left/top)
    pub min: Vec2,
    /// Maximum corner (right/bottom)
    pub max: Vec2,
}

impl Aabb {
    /// Create a box from any two opposite corners.
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: Vec2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Bounding box of a segment. For an axis-aligned wall this is a
    /// zero-thickness box that [`Aabb::inflate`] turns into a slab.
    #[inline]
    pub fn from_segment(p1: Vec2, p2: Vec2) -> Self {
        Self::new(p1, p2)
    }

    /// Square box of side `size` centered on a point.
    #[inline]
    pub fn around(center: Vec2, size: f64) -> Self {
        let half = size / 2.0;
        Self {
            min: Vec2::new(center.x - half, center.y - half),
            max: Vec2::new(center.x + half, center.y + half),
        }
    }

    /// Grow the box by `margin` on every side.
    #[inline]
    pub fn inflate(self, margin: f64) -> Self {
        Self {
            min: Vec2::new(self.min.x - margin, self.min.y - margin),
            max: Vec2::new(self.max.x + margin, self.max.y + margin),
        }
    }

    /// Strict containment: a point lying exactly on an edge is outside.
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x > self.min.x
            && point.x < self.max.x
            && point.y > self.min.y
            && point.y < self.max.y
    }

    /// Strict overlap of two boxes (touching edges do not overlap).
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Whether the x-range of `point` lies outside this box.
    #[inline]
    pub fn outside_x(&self, point: Vec2) -> bool {
        point.x <= self.min.x || point.x >= self.max.x
    }

    /// Whether the y-range of `point` lies outside this box.
    #[inline]
    pub fn outside_y(&self, point: Vec2) -> bool {
        point.y <= self.min.y || point.y >= self.max.y
    }
}

/// Ray–circle intersection.
///
/// Solves `|origin + t·dir - center|² = radius²` for `t`. A hit requires a
/// real solution with **both** roots strictly positive, so a circle behind
/// the origin or one that contains the origin is never hit.
pub fn ray_hits_circle(origin: Vec2, dir: Vec2, center: Vec2, radius: f64) -> bool {
    let a = dir.dot(dir);
    if a == 0.0 {
        return false;
    }

    let offset = origin - center;
    let b = 2.0 * offset.dot(dir);
    let c = offset.dot(offset) - radius * radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return false;
    }

    let root = discriminant.sqrt();
    let near = (-b - root) / (2.0 * a);
    let far = (-b + root) / (2.0 * a);

    near > 0.0 && far > 0.0
}

/// Square universe centered on the origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Half of the universe side length
    pub half: f64,
}

impl Bounds {
    /// Bounds for a universe of the given side length.
    pub fn from_size(size: u32) -> Self {
        Self { half: f64::from(size) / 2.0 }
    }

    /// Whether a point lies inside (edges included).
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x.abs() <= self.half && point.y.abs() <= self.half
    }

    /// Mirror an out-of-bounds move back into the universe.
    ///
    /// Exactly one axis is mirrored, x before y: the overflowing coordinate
    /// becomes the negated coordinate of `previous`, the other keeps the
    /// candidate's value unless that also overflows, in which case it keeps
    /// the previous value. With `previous` inside the bounds the result is
    /// inside too, so warping again is a no-op. Candidates already inside
    /// are returned unchanged.
    pub fn warp(&self, previous: Vec2, candidate: Vec2) -> Vec2 {
        if candidate.x.abs() > self.half {
            let y = if candidate.y.abs() > self.half { previous.y } else { candidate.y };
            Vec2::new(-previous.x, y)
        } else if candidate.y.abs() > self.half {
            Vec2::new(candidate.x, -previous.y)
        } else {
            candidate
        }
    }
}
