//! Powerup Spawning
//!
//! Timer-driven powerup placement. A randomized delay is re-rolled every
//! time a powerup is placed; nothing spawns while the field is full.

use tracing::debug;

use crate::config::GameSettings;
use crate::core::rng::WorldRng;
use crate::game::events::GameEvent;
use crate::game::state::World;

/// Tracks when the next powerup may appear.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerupClock {
    /// Frame of the last placement
    pub last_spawn_frame: u64,
    /// Frames to wait after the last placement
    pub delay: u32,
}

impl PowerupClock {
    /// Start a clock with a freshly rolled delay.
    pub fn new(rng: &mut WorldRng, max_delay: u32) -> Self {
        Self {
            last_spawn_frame: 0,
            delay: rng.roll_delay(max_delay),
        }
    }

    /// Whether the current delay has elapsed.
    #[inline]
    pub fn is_due(&self, frame: u64) -> bool {
        frame.saturating_sub(self.last_spawn_frame) >= u64::from(self.delay)
    }

    /// Restart after a placement.
    pub fn restart(&mut self, frame: u64, rng: &mut WorldRng, max_delay: u32) {
        self.last_spawn_frame = frame;
        self.delay = rng.roll_delay(max_delay);
    }
}

/// Place one powerup if there is room and the delay has elapsed.
pub fn maybe_spawn_powerup(world: &mut World, settings: &GameSettings) -> Option<GameEvent> {
    if world.active_powerup_count() >= settings.max_powerups {
        return None;
    }

    if !world.powerup_clock.is_due(world.frame) {
        return None;
    }

    let position = world.clear_spawn_point(settings);
    let id = world.spawn_powerup(position);

    let frame = world.frame;
    world.powerup_clock.restart(frame, &mut world.rng, settings.max_powerup_delay);

    debug!("Powerup {} spawned at {}, next in {} frames", id, position, world.powerup_clock.delay);
    Some(GameEvent::PowerupSpawned { powerup: id, position })
}
