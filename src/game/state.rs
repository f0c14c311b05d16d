//! World State Definitions
//!
//! The canonical containers for every entity in the arena. Each mutable
//! entity class lives in a single `BTreeMap` keyed by id and carries a
//! [`Lifecycle`] so a one-shot removal notice can reach clients before the
//! entity is physically dropped.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::config::GameSettings;
use crate::core::geometry::{Aabb, Bounds};
use crate::core::rng::WorldRng;
use crate::core::vec2::Vec2;
use crate::game::collision;
use crate::game::powerup::PowerupClock;

/// Entity identifier. Tanks reuse their connection id; every other class
/// draws from its own counter.
pub type EntityId = u32;

/// Spawn retries before giving up on finding a wall-free point.
const MAX_SPAWN_ATTEMPTS: u32 = 10_000;

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Where an entity is in its removal sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Live and simulated.
    Active,
    /// Deactivated this tick; broadcast once more, then removed.
    PendingRemovalNotice,
    /// Hidden from clients. Only dead tanks waiting to respawn sit here.
    Removed,
}

impl Lifecycle {
    /// Whether clients should still see the entity this tick.
    #[inline]
    pub fn is_visible(self) -> bool {
        !matches!(self, Lifecycle::Removed)
    }
}

// =============================================================================
// TANK
// =============================================================================

/// A player-controlled tank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tank {
    /// Connection-assigned id
    pub id: EntityId,
    /// Display name from the handshake
    pub name: String,
    /// Center position
    pub position: Vec2,
    /// Body orientation (axis-aligned unit vector)
    pub orientation: Vec2,
    /// Turret aim (normalized)
    pub aim: Vec2,
    /// Hit points, `0..=max_hp`
    pub hp: u32,
    /// Kill points earned
    pub score: u32,
    /// Cleared while dead
    pub alive: bool,
    /// Set once the connection is gone
    pub disconnected: bool,
    /// First frame the tank is broadcast in (wire `join` flag)
    pub join_frame: u64,
    /// Removal bookkeeping
    pub lifecycle: Lifecycle,

    // =========================================================================
    // WEAPON STATE
    // =========================================================================

    /// Frame of the last main shot
    pub last_fired: Option<u64>,
    /// Set by an alt-fire command, cleared at the end of the same tick
    pub alt_fire_requested: bool,
    /// Beam charges collected from powerups
    pub alt_ammo: u32,
    /// Frame the tank last died on
    pub frame_died: u64,
}

impl Tank {
    /// Create a fresh tank at full health.
    pub fn new(id: EntityId, name: impl Into<String>, position: Vec2, max_hp: u32) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            orientation: Vec2::UP,
            aim: Vec2::UP,
            hp: max_hp,
            score: 0,
            alive: true,
            disconnected: false,
            join_frame: 0,
            lifecycle: Lifecycle::Active,
            last_fired: None,
            alt_fire_requested: false,
            alt_ammo: 0,
            frame_died: 0,
        }
    }

    /// Whether this frame is the tank's first on the wire.
    #[inline]
    pub fn is_joining(&self, frame: u64) -> bool {
        self.join_frame == frame
    }

    /// Whether commands apply and shots can hit this tank.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.alive && !self.disconnected && self.lifecycle == Lifecycle::Active
    }

    /// Whether the main gun has cooled down.
    #[inline]
    pub fn can_fire(&self, frame: u64, frames_per_shot: u64) -> bool {
        match self.last_fired {
            Some(last) => frame.saturating_sub(last) >= frames_per_shot,
            None => true,
        }
    }

    /// Subtract hit points, flooring at zero. Returns true if this hit
    /// killed the tank.
    pub fn apply_damage(&mut self, amount: u32, frame: u64) -> bool {
        if !self.alive {
            return false;
        }
        self.hp = self.hp.saturating_sub(amount);
        if self.hp == 0 {
            self.kill(frame);
            return true;
        }
        false
    }

    /// Mark dead this frame. The death is broadcast once before the tank
    /// leaves the visible set.
    pub fn kill(&mut self, frame: u64) {
        self.hp = 0;
        self.alive = false;
        self.frame_died = frame;
        self.alt_fire_requested = false;
        if self.lifecycle == Lifecycle::Active {
            self.lifecycle = Lifecycle::PendingRemovalNotice;
        }
    }

    /// Bring a dead tank back at full health.
    pub fn respawn(&mut self, position: Vec2, max_hp: u32) {
        self.position = position;
        self.hp = max_hp;
        self.alive = true;
        self.lifecycle = Lifecycle::Active;
    }

    /// Force the tank dead and disconnected, bypassing damage accounting.
    pub fn disconnect(&mut self) {
        self.hp = 0;
        self.alive = false;
        self.disconnected = true;
        self.alt_fire_requested = false;
    }
}

// =============================================================================
// PROJECTILE / BEAM / POWERUP / WALL
// =============================================================================

/// A main-gun shot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Projectile {
    /// Unique projectile id
    pub id: EntityId,
    /// Tank that fired it
    pub owner: EntityId,
    /// Current position
    pub position: Vec2,
    /// Unit travel direction
    pub direction: Vec2,
    /// Removal bookkeeping
    pub lifecycle: Lifecycle,
    /// Frame it was fired on
    pub frame_fired: u64,
    /// Wall reflections so far (bounce mode)
    pub bounces: u32,
    /// Already mirrored at the universe edge once (bounce mode)
    pub warped: bool,
}

impl Projectile {
    /// Whether it still travels.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Stop the projectile; clients see it once more with `died` set.
    #[inline]
    pub fn deactivate(&mut self) {
        self.lifecycle = Lifecycle::PendingRemovalNotice;
    }
}

/// An instantaneous hit-scan beam. Lives for exactly one tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Beam {
    /// Unique beam id
    pub id: EntityId,
    /// Tank that fired it
    pub owner: EntityId,
    /// Ray origin
    pub origin: Vec2,
    /// Ray direction
    pub direction: Vec2,
    /// Removal bookkeeping
    pub lifecycle: Lifecycle,
}

/// A beam charge pickup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Powerup {
    /// Unique powerup id
    pub id: EntityId,
    /// Position
    pub position: Vec2,
    /// Removal bookkeeping
    pub lifecycle: Lifecycle,
    /// Frame it appeared on
    pub frame_spawned: u64,
}

impl Powerup {
    /// Whether it can still be collected.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }
}

/// A static axis-aligned wall segment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    /// Unique wall id
    pub id: EntityId,
    /// First endpoint
    pub p1: Vec2,
    /// Second endpoint
    pub p2: Vec2,
}

impl Wall {
    /// The wall's solid box: the segment grown by half the wall thickness.
    #[inline]
    pub fn solid_box(&self, wall_size: f64) -> Aabb {
        Aabb::from_segment(self.p1, self.p2).inflate(wall_size / 2.0)
    }

    /// Region a tank (or powerup) center may not enter.
    #[inline]
    pub fn tank_box(&self, wall_size: f64, tank_size: f64) -> Aabb {
        self.solid_box(wall_size).inflate(tank_size / 2.0)
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// The whole simulated arena.
#[derive(Clone, Debug)]
pub struct World {
    /// Ticks simulated so far
    pub frame: u64,
    /// Side length of the universe
    pub universe_size: u32,
    /// Universe bounds derived from the size
    pub bounds: Bounds,

    /// Tanks by id
    pub tanks: BTreeMap<EntityId, Tank>,
    /// Projectiles by id
    pub projectiles: BTreeMap<EntityId, Projectile>,
    /// Beams by id
    pub beams: BTreeMap<EntityId, Beam>,
    /// Powerups by id
    pub powerups: BTreeMap<EntityId, Powerup>,
    /// Static walls by id
    pub walls: BTreeMap<EntityId, Wall>,

    /// Spawn and delay randomness
    pub rng: WorldRng,
    /// Powerup spawn timer
    pub powerup_clock: PowerupClock,

    next_projectile_id: EntityId,
    next_beam_id: EntityId,
    next_powerup_id: EntityId,
}

impl World {
    /// Build an empty world with the configured walls.
    pub fn new(settings: &GameSettings, seed: u64) -> Self {
        let mut rng = WorldRng::new(seed);
        let powerup_clock = PowerupClock::new(&mut rng, settings.max_powerup_delay);

        let walls = settings
            .walls
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let id = i as EntityId;
                (id, Wall { id, p1: spec.p1, p2: spec.p2 })
            })
            .collect();

        Self {
            frame: 0,
            universe_size: settings.universe_size,
            bounds: Bounds::from_size(settings.universe_size),
            tanks: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            beams: BTreeMap::new(),
            powerups: BTreeMap::new(),
            walls,
            rng,
            powerup_clock,
            next_projectile_id: 0,
            next_beam_id: 0,
            next_powerup_id: 0,
        }
    }

    /// Create a tank for a freshly handshaken connection.
    pub fn add_tank(&mut self, id: EntityId, name: impl Into<String>, settings: &GameSettings) -> &Tank {
        let position = self.clear_spawn_point(settings);
        let mut tank = Tank::new(id, name, position, settings.max_hp);
        // The next broadcast carries the frame after the current one
        tank.join_frame = self.frame + 1;
        self.tanks.insert(id, tank);
        &self.tanks[&id]
    }

    /// Get a tank by id.
    pub fn tank(&self, id: EntityId) -> Option<&Tank> {
        self.tanks.get(&id)
    }

    /// Whether a tank (or powerup) centered at `point` would sit inside a wall.
    pub fn blocked_for_tank(&self, point: Vec2, settings: &GameSettings) -> bool {
        collision::tank_blocked_by_wall(point, &self.walls, settings)
    }

    /// Random point that does not overlap any wall's inflated box.
    pub fn clear_spawn_point(&mut self, settings: &GameSettings) -> Vec2 {
        let mut candidate = self.rng.random_point(self.bounds);
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            if !self.blocked_for_tank(candidate, settings) {
                return candidate;
            }
            candidate = self.rng.random_point(self.bounds);
        }
        warn!("No wall-free spawn point after {} attempts, using {}", MAX_SPAWN_ATTEMPTS, candidate);
        candidate
    }

    /// Add a projectile and return its id.
    pub fn spawn_projectile(&mut self, owner: EntityId, position: Vec2, direction: Vec2) -> EntityId {
        let id = self.next_projectile_id;
        self.next_projectile_id = self.next_projectile_id.wrapping_add(1);

        self.projectiles.insert(id, Projectile {
            id,
            owner,
            position,
            direction: direction.normalize(),
            lifecycle: Lifecycle::Active,
            frame_fired: self.frame,
            bounces: 0,
            warped: false,
        });
        id
    }

    /// Add a beam and return its id.
    pub fn spawn_beam(&mut self, owner: EntityId, origin: Vec2, direction: Vec2) -> EntityId {
        let id = self.next_beam_id;
        self.next_beam_id = self.next_beam_id.wrapping_add(1);

        self.beams.insert(id, Beam {
            id,
            owner,
            origin,
            direction,
            lifecycle: Lifecycle::Active,
        });
        id
    }

    /// Add a powerup and return its id.
    pub fn spawn_powerup(&mut self, position: Vec2) -> EntityId {
        let id = self.next_powerup_id;
        self.next_powerup_id = self.next_powerup_id.wrapping_add(1);

        self.powerups.insert(id, Powerup {
            id,
            position,
            lifecycle: Lifecycle::Active,
            frame_spawned: self.frame,
        });
        id
    }

    /// Number of collectable powerups.
    pub fn active_powerup_count(&self) -> usize {
        self.powerups.values().filter(|p| p.is_active()).count()
    }

    /// Force a tank dead and disconnected. Unknown ids are ignored.
    pub fn disconnect_tank(&mut self, id: EntityId) -> bool {
        match self.tanks.get_mut(&id) {
            Some(tank) => {
                tank.disconnect();
                true
            }
            None => false,
        }
    }

    /// Physically remove every disconnected tank, returning them so one
    /// last notice can be sent.
    pub fn take_disconnected(&mut self) -> Vec<Tank> {
        let ids: Vec<EntityId> = self
            .tanks
            .values()
            .filter(|t| t.disconnected)
            .map(|t| t.id)
            .collect();

        ids.into_iter()
            .filter_map(|id| self.tanks.remove(&id))
            .collect()
    }

    /// Tanks clients should see this tick (live, or dying this tick).
    pub fn visible_tanks(&self) -> impl Iterator<Item = &Tank> {
        self.tanks
            .values()
            .filter(|t| !t.disconnected && t.lifecycle.is_visible())
    }

    /// Number of live tanks.
    pub fn live_tank_count(&self) -> usize {
        self.tanks.values().filter(|t| t.is_active()).count()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WallSpec;

    fn walled_settings() -> GameSettings {
        GameSettings {
            universe_size: 1000,
            walls: vec![
                WallSpec { p1: Vec2::new(-400.0, -400.0), p2: Vec2::new(400.0, -400.0) },
                WallSpec { p1: Vec2::new(0.0, -300.0), p2: Vec2::new(0.0, 300.0) },
            ],
            ..GameSettings::default()
        }
    }

    #[test]
    fn test_world_loads_walls_in_order() {
        let settings = walled_settings();
        let world = World::new(&settings, 1);

        assert_eq!(world.walls.len(), 2);
        assert_eq!(world.walls[&0].p1, Vec2::new(-400.0, -400.0));
        assert_eq!(world.walls[&1].p2, Vec2::new(0.0, 300.0));
        assert_eq!(world.bounds.half, 500.0);
    }

    #[test]
    fn test_spawn_points_avoid_walls() {
        let settings = walled_settings();
        let mut world = World::new(&settings, 99);

        for _ in 0..500 {
            let p = world.clear_spawn_point(&settings);
            assert!(!world.blocked_for_tank(p, &settings), "spawned inside a wall at {}", p);
            assert!(world.bounds.contains(p));
        }
    }

    #[test]
    fn test_add_tank() {
        let settings = walled_settings();
        let mut world = World::new(&settings, 7);

        let next = world.frame + 1;
        let tank = world.add_tank(4, "alice", &settings);
        assert_eq!(tank.id, 4);
        assert_eq!(tank.name, "alice");
        assert_eq!(tank.hp, settings.max_hp);
        assert_eq!(tank.aim, Vec2::UP);
        assert!(tank.is_joining(next));
        assert!(tank.is_active());
    }

    #[test]
    fn test_damage_floors_at_zero() {
        let mut tank = Tank::new(1, "t", Vec2::ZERO, 3);

        assert!(!tank.apply_damage(1, 10));
        assert_eq!(tank.hp, 2);

        assert!(tank.apply_damage(5, 11));
        assert_eq!(tank.hp, 0);
        assert!(!tank.alive);
        assert_eq!(tank.frame_died, 11);
        assert_eq!(tank.lifecycle, Lifecycle::PendingRemovalNotice);

        // Already dead: no second kill
        assert!(!tank.apply_damage(1, 12));
        assert_eq!(tank.frame_died, 11);
    }

    #[test]
    fn test_fire_cooldown() {
        let mut tank = Tank::new(1, "t", Vec2::ZERO, 3);
        assert!(tank.can_fire(0, 80));

        tank.last_fired = Some(100);
        assert!(!tank.can_fire(179, 80));
        assert!(tank.can_fire(180, 80));
    }

    #[test]
    fn test_disconnect_forces_dead() {
        let settings = GameSettings::default();
        let mut world = World::new(&settings, 3);
        world.add_tank(1, "a", &settings);
        world.add_tank(2, "b", &settings);

        assert!(world.disconnect_tank(1));
        assert!(!world.disconnect_tank(77));

        let tank = world.tank(1).unwrap();
        assert_eq!(tank.hp, 0);
        assert!(!tank.alive);
        assert!(tank.disconnected);
        assert_eq!(world.visible_tanks().count(), 1);

        let gone = world.take_disconnected();
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].id, 1);
        assert!(world.tank(1).is_none());
        assert!(world.take_disconnected().is_empty());
    }

    #[test]
    fn test_entity_ids_monotonic_per_class() {
        let settings = GameSettings::default();
        let mut world = World::new(&settings, 3);

        assert_eq!(world.spawn_projectile(1, Vec2::ZERO, Vec2::UP), 0);
        assert_eq!(world.spawn_projectile(1, Vec2::ZERO, Vec2::UP), 1);
        assert_eq!(world.spawn_beam(1, Vec2::ZERO, Vec2::UP), 0);
        assert_eq!(world.spawn_powerup(Vec2::ZERO), 0);
        assert_eq!(world.spawn_powerup(Vec2::ZERO), 1);
        assert_eq!(world.active_powerup_count(), 2);
    }

    #[test]
    fn test_btreemap_iteration_order() {
        let settings = GameSettings::default();
        let mut world = World::new(&settings, 3);
        for id in [9, 2, 5] {
            world.add_tank(id, "x", &settings);
        }

        let ids: Vec<_> = world.visible_tanks().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
