//! Authoritative Simulation Tick
//!
//! One call to [`tick`] advances the world by exactly one frame. The tick is
//! the only code that mutates the world after a tank has joined; the
//! network layer only reads the result.

use std::collections::BTreeMap;

use crate::config::GameSettings;
use crate::core::vec2::Vec2;
use crate::game::collision;
use crate::game::events::{GameEvent, Weapon};
use crate::game::input::{ControlCommand, FireMode};
use crate::game::powerup::maybe_spawn_powerup;
use crate::game::state::{EntityId, Lifecycle, Projectile, Tank, World};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Frame number that was simulated
    pub frame: u64,
    /// Events generated this tick
    pub events: Vec<GameEvent>,
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `world` - The world (will be mutated)
/// * `commands` - Drained command intake, at most one command per tank
/// * `settings` - Game tunables
///
/// Commands for unknown or dead tanks are skipped silently.
pub fn tick(
    world: &mut World,
    commands: &BTreeMap<EntityId, ControlCommand>,
    settings: &GameSettings,
) -> TickResult {
    // 0. Advance frame counter
    world.frame += 1;
    let mut result = TickResult {
        frame: world.frame,
        events: Vec::new(),
    };

    // 1. Hide tanks whose death has already been announced
    sweep_dead_tanks(world);

    // 2. Revive tanks whose respawn delay has elapsed
    respawn_tanks(world, settings, &mut result.events);

    // 3. Drop entities that were announced dead last tick
    purge_stale_entities(world);

    // 4. Apply each tank's pending command
    apply_commands(world, commands, settings, &mut result.events);

    // 5. Move projectiles and resolve their hits
    step_projectiles(world, settings, &mut result.events);

    // 6. Resolve beams (each lives exactly one tick)
    resolve_beams(world, settings, &mut result.events);

    // 7. Spawn a powerup if one is due
    if let Some(event) = maybe_spawn_powerup(world, settings) {
        result.events.push(event);
    }

    result
}

/// Step 1: a tank whose hp hit zero leaves the visible set one tick after
/// its death was broadcast. A hidden tank whose hp was restored rejoins.
fn sweep_dead_tanks(world: &mut World) {
    for tank in world.tanks.values_mut() {
        if tank.disconnected {
            continue;
        }

        if tank.hp == 0 {
            tank.alive = false;
            tank.lifecycle = Lifecycle::Removed;
        } else if tank.lifecycle == Lifecycle::Removed {
            tank.alive = true;
            tank.lifecycle = Lifecycle::Active;
        }
    }
}

/// Step 2.
fn respawn_tanks(world: &mut World, settings: &GameSettings, events: &mut Vec<GameEvent>) {
    let frame = world.frame;
    let due: Vec<EntityId> = world
        .tanks
        .values()
        .filter(|t| {
            !t.disconnected
                && t.lifecycle == Lifecycle::Removed
                && frame.saturating_sub(t.frame_died) >= settings.respawn_rate
        })
        .map(|t| t.id)
        .collect();

    for id in due {
        let position = world.clear_spawn_point(settings);
        if let Some(tank) = world.tanks.get_mut(&id) {
            tank.respawn(position, settings.max_hp);
            events.push(GameEvent::TankRespawned { tank: id, position });
        }
    }
}

/// Step 3.
fn purge_stale_entities(world: &mut World) {
    world.projectiles.retain(|_, p| p.is_active());
    world.beams.retain(|_, b| b.lifecycle == Lifecycle::Active);
    world.powerups.retain(|_, p| p.is_active());
}

/// Step 4: fire, move, then beam, for every tank with a command.
fn apply_commands(
    world: &mut World,
    commands: &BTreeMap<EntityId, ControlCommand>,
    settings: &GameSettings,
    events: &mut Vec<GameEvent>,
) {
    let frame = world.frame;

    for (&id, command) in commands {
        let (can_fire, position, aim) = match world.tanks.get(&id) {
            Some(tank) if tank.is_active() => {
                (tank.can_fire(frame, settings.frames_per_shot), tank.position, tank.aim)
            }
            _ => continue,
        };

        // Main shot leaves along the aim held before this command
        if command.fire == FireMode::Main && can_fire {
            let projectile = world.spawn_projectile(id, position, aim);
            if let Some(tank) = world.tanks.get_mut(&id) {
                tank.last_fired = Some(frame);
            }
            events.push(GameEvent::ProjectileFired { tank: id, projectile });
        }

        move_tank(world, id, command, settings, events);
        fire_beam(world, id, events);
    }
}

/// Movement, powerup pickup, boundary warp and wall blocking for one tank.
fn move_tank(
    world: &mut World,
    id: EntityId,
    command: &ControlCommand,
    settings: &GameSettings,
    events: &mut Vec<GameEvent>,
) {
    let World { tanks, powerups, walls, bounds, .. } = world;
    let Some(tank) = tanks.get_mut(&id) else {
        return;
    };

    let (velocity, orientation) = match command.moving.direction() {
        Some(dir) => (dir.scale(settings.tank_speed), dir),
        None => (Vec2::ZERO, tank.orientation),
    };

    let old = tank.position;

    // Pickup uses the position held at the start of the move
    for powerup in powerups.values_mut() {
        if powerup.is_active() && collision::tank_reaches_powerup(old, powerup.position, settings.tank_size) {
            powerup.lifecycle = Lifecycle::PendingRemovalNotice;
            tank.alt_ammo += 1;
            events.push(GameEvent::PowerupCollected {
                tank: id,
                powerup: powerup.id,
                ammo: tank.alt_ammo,
            });
        }
    }

    let mut candidate = old + velocity;
    if !bounds.contains(candidate) {
        candidate = bounds.warp(old, candidate);
    }
    if collision::tank_blocked_by_wall(candidate, walls, settings) {
        candidate = old;
    }

    tank.position = candidate;
    tank.orientation = orientation;
    if command.aim.is_finite() && command.aim.length_squared() > 0.0 {
        tank.aim = command.aim;
    }
    if command.fire == FireMode::Alt {
        tank.alt_fire_requested = true;
    }
}

/// Spend a beam charge if one was requested. The request never outlives
/// the tick, charge or not.
fn fire_beam(world: &mut World, id: EntityId, events: &mut Vec<GameEvent>) {
    let (origin, aim) = match world.tanks.get_mut(&id) {
        Some(tank) if tank.alt_fire_requested => {
            tank.alt_fire_requested = false;
            if tank.alt_ammo == 0 {
                return;
            }
            tank.alt_ammo -= 1;
            (tank.position, tank.aim)
        }
        _ => return,
    };

    let beam = world.spawn_beam(id, origin, aim);
    events.push(GameEvent::BeamFired { tank: id, beam });
}

/// Step 5.
fn step_projectiles(world: &mut World, settings: &GameSettings, events: &mut Vec<GameEvent>) {
    let frame = world.frame;
    let World { projectiles, tanks, walls, bounds, .. } = world;

    for projectile in projectiles.values_mut() {
        if !projectile.is_active() {
            continue;
        }

        let old = projectile.position;
        let mut candidate = old + projectile.direction.scale(settings.projectile_speed);

        if settings.bounce_mode && projectile.bounces < settings.max_bounces {
            if let Some(wall) = collision::projectile_wall_hit(candidate, walls, settings.wall_size) {
                let solid = wall.solid_box(settings.wall_size);
                projectile.direction = collision::reflect_off_box(projectile.direction, old, &solid);
                projectile.bounces += 1;
                candidate = old;
            }
        } else if collision::projectile_wall_hit(candidate, walls, settings.wall_size).is_some() {
            projectile.position = candidate;
            projectile.deactivate();
            continue;
        }

        if !bounds.contains(candidate) {
            if settings.bounce_mode && !projectile.warped {
                candidate = bounds.warp(old, candidate);
                projectile.warped = true;
            } else {
                projectile.position = candidate;
                projectile.deactivate();
                continue;
            }
        }

        projectile.position = candidate;
        resolve_projectile_hit(projectile, tanks, frame, settings, events);
    }
}

/// First live tank (by id) other than the owner within reach takes the hit.
fn resolve_projectile_hit(
    projectile: &mut Projectile,
    tanks: &mut BTreeMap<EntityId, Tank>,
    frame: u64,
    settings: &GameSettings,
    events: &mut Vec<GameEvent>,
) {
    let Some(victim) = tanks.values_mut().find(|t| {
        t.id != projectile.owner
            && t.is_active()
            && collision::projectile_hits_tank(projectile.position, t.position, settings.tank_size)
    }) else {
        return;
    };

    projectile.deactivate();
    let victim_id = victim.id;
    let lethal = victim.apply_damage(settings.projectile_damage, frame);
    events.push(GameEvent::TankHit {
        victim: victim_id,
        attacker: projectile.owner,
        weapon: Weapon::Projectile,
        hp: victim.hp,
    });

    if lethal {
        award_kill(tanks, projectile.owner, settings.projectile_kill_points);
        events.push(GameEvent::TankKilled {
            victim: victim_id,
            killer: projectile.owner,
            weapon: Weapon::Projectile,
            points: settings.projectile_kill_points,
        });
    }
}

/// Step 6.
fn resolve_beams(world: &mut World, settings: &GameSettings, events: &mut Vec<GameEvent>) {
    let frame = world.frame;
    let World { beams, tanks, .. } = world;

    for beam in beams.values_mut() {
        if beam.lifecycle != Lifecycle::Active {
            continue;
        }

        let victims: Vec<EntityId> = tanks
            .values()
            .filter(|t| {
                t.id != beam.owner
                    && t.is_active()
                    && collision::beam_hits_tank(beam, t.position, settings.tank_size)
            })
            .map(|t| t.id)
            .collect();

        for victim_id in victims {
            let Some(victim) = tanks.get_mut(&victim_id) else {
                continue;
            };
            let lethal = victim.apply_damage(settings.beam_damage, frame);
            events.push(GameEvent::TankHit {
                victim: victim_id,
                attacker: beam.owner,
                weapon: Weapon::Beam,
                hp: victim.hp,
            });

            if lethal {
                award_kill(tanks, beam.owner, settings.beam_kill_points);
                events.push(GameEvent::TankKilled {
                    victim: victim_id,
                    killer: beam.owner,
                    weapon: Weapon::Beam,
                    points: settings.beam_kill_points,
                });
            }
        }

        beam.lifecycle = Lifecycle::PendingRemovalNotice;
    }
}

/// Credit the shooter, if still present (it may be dead, never disconnected).
fn award_kill(tanks: &mut BTreeMap<EntityId, Tank>, owner: EntityId, points: u32) {
    if let Some(owner) = tanks.get_mut(&owner) {
        owner.score += points;
    }
}

// =============================================================================
// TESTS
// =============================================================================
