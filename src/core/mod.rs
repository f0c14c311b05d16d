//! Geometry and randomness primitives.
//!
//! Pure types with no knowledge of tanks or connections. Everything in
//! `game/` is built on top of these.

pub mod vec2;
pub mod geometry;
pub mod rng;

// Re-export core types
pub use vec2::Vec2;
pub use geometry::{Aabb, Bounds, ray_hits_circle};
pub use rng::WorldRng;
