//! # Tank Wars Server
//!
//! Authoritative arena server for Tank Wars. Clients stream control
//! commands over TCP; the server simulates the arena at a fixed frame rate
//! and broadcasts every entity each frame.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TANK WARS SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - JSON game settings                        │
//! │                                                              │
//! │  core/           - Geometry and randomness primitives        │
//! │  ├── vec2.rs     - 2D vector                                 │
//! │  ├── geometry.rs - Boxes, ray tests, universe bounds         │
//! │  └── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │                                                              │
//! │  game/           - Arena simulation (deterministic)          │
//! │  ├── input.rs    - Control commands and intake               │
//! │  ├── state.rs    - World, tanks, projectiles, walls          │
//! │  ├── tick.rs     - Authoritative simulation step             │
//! │  ├── collision.rs- Wall, hit and pickup tests                │
//! │  ├── powerup.rs  - Powerup spawning                          │
//! │  └── events.rs   - Tick events                               │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Line-delimited JSON records               │
//! │  ├── session.rs  - Connection state machine                  │
//! │  ├── server.rs   - TCP server and broadcast                  │
//! │  └── client.rs   - Client state machine and TCP client       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Given the same settings, seed and per-frame commands, `game::tick`
//! produces the same world on every run:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies inside the simulation
//! - All randomness from seeded Xorshift128+

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{GameSettings, SettingsError, WallSpec};
pub use core::vec2::Vec2;
pub use core::rng::WorldRng;
pub use game::input::{CommandIntake, ControlCommand, FireMode, Movement};
pub use game::state::{EntityId, World};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listening port
pub const DEFAULT_PORT: u16 = 11000;

/// Longest name a client will send
pub const MAX_NAME_LEN: usize = 15;
