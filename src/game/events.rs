//! Game Events
//!
//! Notable things that happened during a tick. The server logs them; tests
//! assert on them. They are never sent over the wire.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::state::EntityId;

/// What dealt the damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weapon {
    /// Main-gun projectile
    Projectile,
    /// Alt-fire beam
    Beam,
}

/// A single tick event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A main shot left the barrel
    ProjectileFired {
        /// Shooter
        tank: EntityId,
        /// New projectile id
        projectile: EntityId,
    },

    /// A beam was fired, spending one charge
    BeamFired {
        /// Shooter
        tank: EntityId,
        /// New beam id
        beam: EntityId,
    },

    /// A tank lost hit points
    TankHit {
        /// Tank that was hit
        victim: EntityId,
        /// Owner of the projectile or beam
        attacker: EntityId,
        /// What hit it
        weapon: Weapon,
        /// Hit points left
        hp: u32,
    },

    /// A hit brought a tank to zero
    TankKilled {
        /// Tank that died
        victim: EntityId,
        /// Tank credited with the kill
        killer: EntityId,
        /// What killed it
        weapon: Weapon,
        /// Score awarded to the killer
        points: u32,
    },

    /// A dead tank came back
    TankRespawned {
        /// Tank id
        tank: EntityId,
        /// Spawn point
        position: Vec2,
    },

    /// A tank drove over a powerup
    PowerupCollected {
        /// Collector
        tank: EntityId,
        /// Powerup id
        powerup: EntityId,
        /// Beam charges after pickup
        ammo: u32,
    },

    /// A powerup appeared
    PowerupSpawned {
        /// Powerup id
        powerup: EntityId,
        /// Where it appeared
        position: Vec2,
    },
}

impl GameEvent {
    /// Whether the event is worth an `info!` line rather than `debug!`.
    pub fn is_notable(&self) -> bool {
        matches!(self, GameEvent::TankKilled { .. } | GameEvent::TankRespawned { .. })
    }
}
