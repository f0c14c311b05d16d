//! Collision Detection
//!
//! Arena-specific collision checks built on the geometry primitives.
//! Tanks, projectiles and beams all use the tank size as hit radius.

use std::collections::BTreeMap;

use crate::config::GameSettings;
use crate::core::geometry::{Aabb, ray_hits_circle};
use crate::core::vec2::Vec2;
use crate::game::state::{Beam, EntityId, Wall};

/// Whether a tank centered at `point` would overlap any wall.
pub fn tank_blocked_by_wall(
    point: Vec2,
    walls: &BTreeMap<EntityId, Wall>,
    settings: &GameSettings,
) -> bool {
    walls
        .values()
        .any(|wall| wall.tank_box(settings.wall_size, settings.tank_size).contains(point))
}

/// First wall (by id) whose solid box contains the projectile position.
pub fn projectile_wall_hit<'a>(
    point: Vec2,
    walls: &'a BTreeMap<EntityId, Wall>,
    wall_size: f64,
) -> Option<&'a Wall> {
    walls
        .values()
        .find(|wall| wall.solid_box(wall_size).contains(point))
}

/// Reflect a direction off the box edge that was struck coming from `previous`.
///
/// Coming from beside the box means a vertical edge was hit and the
/// horizontal component flips; coming from above or below flips the vertical
/// component. A start inside the box (a corner graze) reverses both.
pub fn reflect_off_box(direction: Vec2, previous: Vec2, solid: &Aabb) -> Vec2 {
    if solid.outside_x(previous) {
        direction.flip_x()
    } else if solid.outside_y(previous) {
        direction.flip_y()
    } else {
        -direction
    }
}

/// Projectile–tank proximity test.
#[inline]
pub fn projectile_hits_tank(projectile: Vec2, tank: Vec2, tank_size: f64) -> bool {
    projectile.distance(tank) <= tank_size
}

/// Tank–powerup proximity test.
#[inline]
pub fn tank_reaches_powerup(tank: Vec2, powerup: Vec2, tank_size: f64) -> bool {
    tank.distance(powerup) <= tank_size
}

/// Beam–tank ray test.
#[inline]
pub fn beam_hits_tank(beam: &Beam, tank: Vec2, tank_size: f64) -> bool {
    ray_hits_circle(beam.origin, beam.direction, tank, tank_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Lifecycle;

    fn walls(list: &[(Vec2, Vec2)]) -> BTreeMap<EntityId, Wall> {
        list.iter()
            .enumerate()
            .map(|(i, (p1, p2))| (i as EntityId, Wall { id: i as EntityId, p1: *p1, p2: *p2 }))
            .collect()
    }

    #[test]
    fn test_tank_blocked_by_inflated_wall() {
        let settings = GameSettings::default(); // wall 50, tank 60
        let walls = walls(&[(Vec2::new(0.0, -100.0), Vec2::new(0.0, 100.0))]);

        // Solid box x in (-25, 25), tank box x in (-55, 55)
        assert!(tank_blocked_by_wall(Vec2::new(54.0, 0.0), &walls, &settings));
        assert!(!tank_blocked_by_wall(Vec2::new(55.0, 0.0), &walls, &settings));
        assert!(tank_blocked_by_wall(Vec2::new(0.0, 150.0), &walls, &settings));
        assert!(!tank_blocked_by_wall(Vec2::new(0.0, 160.0), &walls, &settings));
    }

    #[test]
    fn test_projectile_wall_hit_uses_solid_box_only() {
        let walls = walls(&[
            (Vec2::new(0.0, -100.0), Vec2::new(0.0, 100.0)),
            (Vec2::new(300.0, 0.0), Vec2::new(500.0, 0.0)),
        ]);

        assert_eq!(projectile_wall_hit(Vec2::new(20.0, 0.0), &walls, 50.0).map(|w| w.id), Some(0));
        assert!(projectile_wall_hit(Vec2::new(30.0, 0.0), &walls, 50.0).is_none());
        assert_eq!(projectile_wall_hit(Vec2::new(400.0, 10.0), &walls, 50.0).map(|w| w.id), Some(1));
    }

    #[test]
    fn test_reflect_side_hit_flips_x() {
        let solid = Aabb::new(Vec2::new(-25.0, -100.0), Vec2::new(25.0, 100.0));
        let dir = Vec2::new(0.6, 0.8);
        let reflected = reflect_off_box(dir, Vec2::new(-30.0, 0.0), &solid);
        assert_eq!(reflected, Vec2::new(-0.6, 0.8));
    }

    #[test]
    fn test_reflect_end_cap_hit_flips_y() {
        let solid = Aabb::new(Vec2::new(-25.0, -100.0), Vec2::new(25.0, 100.0));
        let dir = Vec2::new(0.0, 1.0);
        let reflected = reflect_off_box(dir, Vec2::new(0.0, -110.0), &solid);
        assert_eq!(reflected, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn test_proximity_tests() {
        assert!(projectile_hits_tank(Vec2::ZERO, Vec2::new(60.0, 0.0), 60.0));
        assert!(!projectile_hits_tank(Vec2::ZERO, Vec2::new(60.5, 0.0), 60.0));
        assert!(tank_reaches_powerup(Vec2::ZERO, Vec2::new(30.0, 40.0), 60.0));
        assert!(!tank_reaches_powerup(Vec2::ZERO, Vec2::new(60.0, 40.0), 60.0));
    }

    #[test]
    fn test_beam_hits_tank_ahead_only() {
        let beam = Beam {
            id: 0,
            owner: 1,
            origin: Vec2::ZERO,
            direction: Vec2::RIGHT,
            lifecycle: Lifecycle::Active,
        };

        assert!(beam_hits_tank(&beam, Vec2::new(500.0, 20.0), 60.0));
        assert!(!beam_hits_tank(&beam, Vec2::new(-500.0, 0.0), 60.0));
        assert!(!beam_hits_tank(&beam, Vec2::new(500.0, 70.0), 60.0));
    }
}
