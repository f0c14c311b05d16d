//! Game Logic Module
//!
//! All arena simulation code. Given the same seed and command stream the
//! simulation is fully deterministic.
//!
//! ## Module Structure
//!
//! - `input`: Control commands and the last-write-wins command intake
//! - `state`: World state, tanks, projectiles, beams, powerups, walls
//! - `tick`: Authoritative simulation step
//! - `collision`: Wall, hit and pickup tests
//! - `powerup`: Timer-driven powerup spawning
//! - `events`: Tick events for logging and tests

pub mod input;
pub mod state;
pub mod tick;
pub mod collision;
pub mod powerup;
pub mod events;

// Re-export key types
pub use input::{CommandIntake, ControlCommand, FireMode, Movement};
pub use state::{Beam, EntityId, Lifecycle, Powerup, Projectile, Tank, Wall, World};
pub use tick::{tick, TickResult};
pub use events::{GameEvent, Weapon};
