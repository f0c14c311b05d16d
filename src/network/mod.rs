//! Network Layer
//!
//! Line-oriented TCP transport for real-time multiplayer.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod session;
pub mod server;
pub mod client;

pub use protocol::{
    decode_command, decode_record, encode_frame, handshake_reply, LineBuffer, ProtocolError,
    WireCommand, WorldRecord,
};
pub use session::{Connection, ConnectionPhase, SessionAction};
pub use server::{ConnectionRegistry, GameServer, GameServerError, ServerConfig};
pub use client::{ClientError, ClientEvent, ClientPhase, ClientSession, ClientWorld, GameClient};
