//! Game Client
//!
//! Client side of the line protocol: a pure handshake/stream state machine,
//! a mirror of the server world built from received records, and an async
//! TCP client that runs separate reader and writer tasks.

use std::collections::BTreeMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::input::ControlCommand;
use crate::game::state::EntityId;
use crate::network::protocol::{
    decode_record, encode_command, BeamRecord, LineBuffer, PowerupRecord, ProjectileRecord,
    ProtocolError, TankRecord, WallRecord, WorldRecord,
};
use crate::MAX_NAME_LEN;

/// Outgoing command queue depth.
const OUTGOING_QUEUE: usize = 64;

/// Decoded event queue depth.
const INCOMING_QUEUE: usize = 4096;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Name rejected before it was sent.
    #[error("Name is {len} characters, limit is {max}")]
    NameTooLong {
        /// Length of the rejected name
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server sent something unparseable.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection ended before the handshake finished.
    #[error("Server did not complete the handshake")]
    Handshake,

    /// Reader or writer task has stopped.
    #[error("Disconnected")]
    Disconnected,
}

// =============================================================================
// CLIENT STATE MACHINE
// =============================================================================

/// Client protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// Name not sent yet.
    Connecting,
    /// Waiting for the id and size lines.
    Handshaking,
    /// Receiving entity records.
    Streaming,
}

/// Something the server told us.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Handshake finished.
    Handshake {
        /// Our tank id
        player_id: EntityId,
        /// Universe side length
        world_size: u32,
    },
    /// One entity record.
    Record(WorldRecord),
}

/// Pure client protocol state.
#[derive(Debug)]
pub struct ClientSession {
    phase: ClientPhase,
    buffer: LineBuffer,
    player_id: Option<EntityId>,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    /// Fresh session.
    pub fn new() -> Self {
        Self {
            phase: ClientPhase::Connecting,
            buffer: LineBuffer::new(),
            player_id: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Record that the name line has gone out.
    pub fn name_sent(&mut self) {
        if self.phase == ClientPhase::Connecting {
            self.phase = ClientPhase::Handshaking;
        }
    }

    /// Process bytes from one read.
    ///
    /// A malformed handshake line is fatal, as is an unterminated line past
    /// the buffer limit. Malformed records after the handshake are skipped.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ClientEvent>, ProtocolError> {
        self.name_sent();
        self.buffer.push(bytes)?;

        let mut events = Vec::new();
        while let Some(line) = self.buffer.next_line() {
            match self.phase {
                ClientPhase::Connecting | ClientPhase::Handshaking => {
                    let value: u32 = line
                        .trim()
                        .parse()
                        .map_err(|_| ProtocolError::BadHandshake(line.clone()))?;

                    match self.player_id {
                        None => self.player_id = Some(value),
                        Some(player_id) => {
                            self.phase = ClientPhase::Streaming;
                            events.push(ClientEvent::Handshake { player_id, world_size: value });
                        }
                    }
                }
                ClientPhase::Streaming => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match decode_record(&line) {
                        Ok(record) => events.push(ClientEvent::Record(record)),
                        Err(e) => warn!("Skipping bad record: {}", e),
                    }
                }
            }
        }

        Ok(events)
    }
}

// =============================================================================
// WORLD MIRROR
// =============================================================================

/// What a client knows about the arena.
#[derive(Debug, Default, Clone)]
pub struct ClientWorld {
    /// Our tank id
    pub player_id: Option<EntityId>,
    /// Universe side length
    pub world_size: u32,
    /// Live tanks
    pub tanks: BTreeMap<EntityId, TankRecord>,
    /// Live projectiles
    pub projectiles: BTreeMap<EntityId, ProjectileRecord>,
    /// Live powerups
    pub powerups: BTreeMap<EntityId, PowerupRecord>,
    /// Static walls
    pub walls: BTreeMap<EntityId, WallRecord>,
    beams: Vec<BeamRecord>,
}

impl ClientWorld {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the mirror.
    pub fn apply_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Handshake { player_id, world_size } => {
                self.player_id = Some(player_id);
                self.world_size = world_size;
            }
            ClientEvent::Record(record) => self.apply(record),
        }
    }

    /// Fold one record into the mirror. Dead or departed entities retire.
    pub fn apply(&mut self, record: WorldRecord) {
        match record {
            WorldRecord::Tank(t) => {
                if t.died || t.dc {
                    self.tanks.remove(&t.tank);
                } else {
                    self.tanks.insert(t.tank, t);
                }
            }
            WorldRecord::Projectile(p) => {
                if p.died {
                    self.projectiles.remove(&p.proj);
                } else {
                    self.projectiles.insert(p.proj, p);
                }
            }
            WorldRecord::Powerup(p) => {
                if p.died {
                    self.powerups.remove(&p.power);
                } else {
                    self.powerups.insert(p.power, p);
                }
            }
            WorldRecord::Wall(w) => {
                self.walls.insert(w.wall, w);
            }
            WorldRecord::Beam(b) => self.beams.push(b),
        }
    }

    /// Beams received since the last call. Each is returned once.
    pub fn take_beams(&mut self) -> Vec<BeamRecord> {
        std::mem::take(&mut self.beams)
    }

    /// Our own tank, if alive and known.
    pub fn own_tank(&self) -> Option<&TankRecord> {
        self.player_id.and_then(|id| self.tanks.get(&id))
    }
}

// =============================================================================
// ASYNC TCP CLIENT
// =============================================================================

/// Connected game client.
pub struct GameClient {
    player_id: EntityId,
    world_size: u32,
    outgoing: mpsc::Sender<String>,
    incoming: mpsc::Receiver<ClientEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl GameClient {
    /// Connect, send the name and wait for the id and size lines.
    pub async fn connect(addr: impl ToSocketAddrs, name: &str) -> Result<Self, ClientError> {
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(ClientError::NameTooLong { len, max: MAX_NAME_LEN });
        }

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, mut write_half) = stream.into_split();

        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_QUEUE);
        let (incoming_tx, mut incoming) = mpsc::channel::<ClientEvent>(INCOMING_QUEUE);

        // Writer task
        let writer = tokio::spawn(async move {
            while let Some(line) = outgoing_rx.recv().await {
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    warn!("Failed to send to server: {}", e);
                    break;
                }
            }
            debug!("Client writer ended");
        });

        outgoing
            .send(format!("{}\n", name))
            .await
            .map_err(|_| ClientError::Disconnected)?;

        // Reader task
        let reader = tokio::spawn(async move {
            let mut session = ClientSession::new();
            session.name_sent();
            let mut buf = vec![0u8; 8192];

            loop {
                let n = match read_half.read(&mut buf).await {
                    Ok(0) => {
                        info!("Server closed connection");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Read error: {}", e);
                        break;
                    }
                };

                let events = match session.feed(&buf[..n]) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Handshake failed: {}", e);
                        break;
                    }
                };

                for event in events {
                    if incoming_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        let (player_id, world_size) = match incoming.recv().await {
            Some(ClientEvent::Handshake { player_id, world_size }) => (player_id, world_size),
            _ => {
                reader.abort();
                writer.abort();
                return Err(ClientError::Handshake);
            }
        };

        info!("Joined as tank {} in a {} world", player_id, world_size);

        Ok(Self {
            player_id,
            world_size,
            outgoing,
            incoming,
            reader,
            writer,
        })
    }

    /// Our tank id.
    pub fn player_id(&self) -> EntityId {
        self.player_id
    }

    /// Universe side length.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Queue a control command.
    pub async fn send_command(&self, command: &ControlCommand) -> Result<(), ClientError> {
        let line = encode_command(command)?;
        self.send_line(line).await
    }

    /// Queue a raw line (terminator appended if missing).
    pub async fn send_line(&self, mut line: String) -> Result<(), ClientError> {
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.outgoing
            .send(line)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    /// Next event, or `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.incoming.recv().await
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
