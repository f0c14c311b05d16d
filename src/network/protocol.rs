//! Protocol Messages
//!
//! Wire format for client-server communication over plain TCP.
//! Every message is one JSON object terminated by `\n`. There is no
//! envelope: the record type is recognized by which discriminator key
//! it carries (`tank`, `proj`, `wall`, `beam` or `power`, tested in that
//! order). The handshake reply starts with two bare integer lines.

use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;

use crate::core::vec2::Vec2;
use crate::game::input::{ControlCommand, FireMode, Movement};
use crate::game::state::{Beam, EntityId, Powerup, Projectile, Tank, Wall, World};

/// Line terminator for every record.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest unterminated line a peer may leave buffered.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not valid JSON, or a field had the wrong shape.
    #[error("Malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// `moving` outside `none|up|left|down|right`.
    #[error("Unknown movement: {0:?}")]
    UnknownMovement(String),

    /// `fire` outside `none|main|alt`.
    #[error("Unknown fire mode: {0:?}")]
    UnknownFire(String),

    /// Command without a `tdir` vector.
    #[error("Command is missing its aim vector")]
    MissingAim,

    /// Object without any known discriminator key.
    #[error("Record has no known type key")]
    UnknownRecord,

    /// Handshake line that is not a plain integer.
    #[error("Bad handshake line: {0:?}")]
    BadHandshake(String),

    /// Peer sent more than the line limit without a terminator.
    #[error("Line exceeds {max} bytes ({len} buffered)")]
    LineTooLong {
        /// Bytes buffered since the last terminator
        len: usize,
        /// Allowed maximum
        max: usize,
    },
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Control command as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommand {
    /// Movement spelling
    pub moving: String,
    /// Fire spelling
    pub fire: String,
    /// Turret aim
    #[serde(default)]
    pub tdir: Option<Vec2>,
}

impl WireCommand {
    /// Validate into a simulation command.
    pub fn validate(self) -> Result<ControlCommand, ProtocolError> {
        let moving = Movement::parse(&self.moving)
            .ok_or(ProtocolError::UnknownMovement(self.moving))?;
        let fire = FireMode::parse(&self.fire)
            .ok_or(ProtocolError::UnknownFire(self.fire))?;
        let aim = self.tdir.ok_or(ProtocolError::MissingAim)?;

        Ok(ControlCommand::new(moving, fire, aim))
    }
}

impl From<&ControlCommand> for WireCommand {
    fn from(command: &ControlCommand) -> Self {
        Self {
            moving: command.moving.as_str().to_string(),
            fire: command.fire.as_str().to_string(),
            tdir: Some(command.aim),
        }
    }
}

/// Decode and validate one command line.
pub fn decode_command(line: &str) -> Result<ControlCommand, ProtocolError> {
    let wire: WireCommand = serde_json::from_str(line)?;
    wire.validate()
}

/// Encode a command as one terminated line.
pub fn encode_command(command: &ControlCommand) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(&WireCommand::from(command))?;
    line.push('\n');
    Ok(line)
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Tank record. Field order matches what existing clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankRecord {
    /// Tank id
    pub tank: EntityId,
    /// Display name
    pub name: String,
    /// Position
    pub loc: Vec2,
    /// Body orientation
    pub bdir: Vec2,
    /// Turret aim
    pub tdir: Vec2,
    /// Score
    pub score: u32,
    /// Hit points
    pub hp: u32,
    /// Dead this frame (or still dead)
    pub died: bool,
    /// Disconnected
    pub dc: bool,
    /// First frame on the wire
    pub join: bool,
}

impl TankRecord {
    /// Snapshot a tank as seen during `frame`.
    pub fn from_tank(tank: &Tank, frame: u64) -> Self {
        Self {
            tank: tank.id,
            name: tank.name.clone(),
            loc: tank.position,
            bdir: tank.orientation,
            tdir: tank.aim,
            score: tank.score,
            hp: tank.hp,
            died: !tank.alive,
            dc: tank.disconnected,
            join: tank.is_joining(frame),
        }
    }
}

/// Projectile record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileRecord {
    /// Projectile id
    pub proj: EntityId,
    /// Position
    pub loc: Vec2,
    /// Travel direction
    pub dir: Vec2,
    /// Stopped this frame
    pub died: bool,
    /// Shooter
    pub owner: EntityId,
}

impl From<&Projectile> for ProjectileRecord {
    fn from(p: &Projectile) -> Self {
        Self {
            proj: p.id,
            loc: p.position,
            dir: p.direction,
            died: !p.is_active(),
            owner: p.owner,
        }
    }
}

/// Wall record, sent only during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallRecord {
    /// Wall id
    pub wall: EntityId,
    /// First endpoint
    pub p1: Vec2,
    /// Second endpoint
    pub p2: Vec2,
}

impl From<&Wall> for WallRecord {
    fn from(w: &Wall) -> Self {
        Self { wall: w.id, p1: w.p1, p2: w.p2 }
    }
}

/// Beam record. Seen exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamRecord {
    /// Beam id
    pub beam: EntityId,
    /// Ray origin
    pub org: Vec2,
    /// Ray direction
    pub dir: Vec2,
    /// Shooter
    pub owner: EntityId,
}

impl From<&Beam> for BeamRecord {
    fn from(b: &Beam) -> Self {
        Self { beam: b.id, org: b.origin, dir: b.direction, owner: b.owner }
    }
}

/// Powerup record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerupRecord {
    /// Powerup id
    pub power: EntityId,
    /// Position
    pub loc: Vec2,
    /// Collected this frame
    pub died: bool,
}

impl From<&Powerup> for PowerupRecord {
    fn from(p: &Powerup) -> Self {
        Self { power: p.id, loc: p.position, died: !p.is_active() }
    }
}

/// Any server-to-client entity record.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldRecord {
    /// Tank
    Tank(TankRecord),
    /// Projectile
    Projectile(ProjectileRecord),
    /// Wall
    Wall(WallRecord),
    /// Beam
    Beam(BeamRecord),
    /// Powerup
    Powerup(PowerupRecord),
}

impl WorldRecord {
    /// Serialize to JSON (without terminator).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            WorldRecord::Tank(r) => serde_json::to_string(r),
            WorldRecord::Projectile(r) => serde_json::to_string(r),
            WorldRecord::Wall(r) => serde_json::to_string(r),
            WorldRecord::Beam(r) => serde_json::to_string(r),
            WorldRecord::Powerup(r) => serde_json::to_string(r),
        }
    }

    /// Deserialize from JSON by discriminator key.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        decode_record(s)
    }
}

/// Decode one record line. Key presence decides the type, in the order
/// tank, proj, wall, beam, power.
pub fn decode_record(line: &str) -> Result<WorldRecord, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let object = value.as_object().ok_or(ProtocolError::UnknownRecord)?;

    if object.contains_key("tank") {
        Ok(WorldRecord::Tank(from_value(value)?))
    } else if object.contains_key("proj") {
        Ok(WorldRecord::Projectile(from_value(value)?))
    } else if object.contains_key("wall") {
        Ok(WorldRecord::Wall(from_value(value)?))
    } else if object.contains_key("beam") {
        Ok(WorldRecord::Beam(from_value(value)?))
    } else if object.contains_key("power") {
        Ok(WorldRecord::Powerup(from_value(value)?))
    } else {
        Err(ProtocolError::UnknownRecord)
    }
}

fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}

fn push_record<T: Serialize>(out: &mut String, record: &T) -> Result<(), ProtocolError> {
    out.push_str(&serde_json::to_string(record)?);
    out.push('\n');
    Ok(())
}

/// Handshake reply: id line, size line, then one record per wall.
pub fn handshake_reply<'a>(
    id: EntityId,
    universe_size: u32,
    walls: impl IntoIterator<Item = &'a Wall>,
) -> Result<String, ProtocolError> {
    let mut out = format!("{}\n{}\n", id, universe_size);
    for wall in walls {
        push_record(&mut out, &WallRecord::from(wall))?;
    }
    Ok(out)
}

/// Everything clients see for the current frame: visible tanks, then
/// projectiles, beams and powerups. Entities that stopped this frame are
/// included once with `died` set.
pub fn encode_frame(world: &World) -> Result<String, ProtocolError> {
    let mut out = String::new();

    for tank in world.visible_tanks() {
        push_record(&mut out, &TankRecord::from_tank(tank, world.frame))?;
    }
    for projectile in world.projectiles.values() {
        push_record(&mut out, &ProjectileRecord::from(projectile))?;
    }
    for beam in world.beams.values() {
        push_record(&mut out, &BeamRecord::from(beam))?;
    }
    for powerup in world.powerups.values() {
        push_record(&mut out, &PowerupRecord::from(powerup))?;
    }

    Ok(out)
}

/// One final record per departed tank, with `dc` and `died` set.
pub fn encode_departures(tanks: &[Tank]) -> Result<String, ProtocolError> {
    let mut out = String::new();
    for tank in tanks {
        let mut record = TankRecord::from_tank(tank, u64::MAX);
        record.died = true;
        record.dc = true;
        record.join = false;
        push_record(&mut out, &record)?;
    }
    Ok(out)
}

// =============================================================================
// LINE FRAMING
// =============================================================================

/// Accumulates raw bytes and yields complete lines.
///
/// A trailing fragment without a terminator stays buffered until the rest
/// arrives, up to a fixed limit. A `\r` before the terminator is dropped.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create an empty buffer with the default line limit.
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_LEN)
    }

    /// Create an empty buffer that rejects fragments longer than `max_line`.
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
        }
    }

    /// Append bytes from one read.
    ///
    /// Fails once the unterminated tail grows past the line limit. Complete
    /// lines already buffered can still be taken with [`next_line`](Self::next_line).
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.pending.extend_from_slice(bytes);
        let tail_start = self
            .pending
            .iter()
            .rposition(|&b| b == LINE_TERMINATOR)
            .map_or(0, |i| i + 1);
        let tail = self.pending.len() - tail_start;
        if tail > self.max_line {
            return Err(ProtocolError::LineTooLong { len: tail, max: self.max_line });
        }
        Ok(())
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == LINE_TERMINATOR)?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes waiting for a terminator.
    pub fn fragment_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameSettings, WallSpec};

    #[test]
    fn test_decode_command() {
        let cmd = decode_command(r#"{"moving":"left","fire":"main","tdir":{"x":0.6,"y":0.8}}"#).unwrap();
        assert_eq!(cmd.moving, Movement::Left);
        assert_eq!(cmd.fire, FireMode::Main);
        assert_eq!(cmd.aim, Vec2::new(0.6, 0.8));
    }

    #[test]
    fn test_decode_command_rejects_bad_values() {
        let sideways = decode_command(r#"{"moving":"sideways","fire":"none","tdir":{"x":0,"y":1}}"#);
        assert!(matches!(sideways, Err(ProtocolError::UnknownMovement(m)) if m == "sideways"));

        let nuke = decode_command(r#"{"moving":"up","fire":"nuke","tdir":{"x":0,"y":1}}"#);
        assert!(matches!(nuke, Err(ProtocolError::UnknownFire(_))));

        let no_aim = decode_command(r#"{"moving":"up","fire":"none"}"#);
        assert!(matches!(no_aim, Err(ProtocolError::MissingAim)));

        let null_aim = decode_command(r#"{"moving":"up","fire":"none","tdir":null}"#);
        assert!(matches!(null_aim, Err(ProtocolError::MissingAim)));

        assert!(matches!(decode_command("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode_command(r#"{"fire":"none"}"#), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_command_encoding_uses_wire_spellings() {
        let line = encode_command(&ControlCommand::new(Movement::Down, FireMode::Alt, Vec2::RIGHT)).unwrap();
        assert_eq!(line, "{\"moving\":\"down\",\"fire\":\"alt\",\"tdir\":{\"x\":1.0,\"y\":0.0}}\n");
    }

    #[test]
    fn test_tank_record_field_order() {
        let tank = Tank::new(3, "bob", Vec2::new(1.0, 2.0), 3);
        let json = serde_json::to_string(&TankRecord::from_tank(&tank, 0)).unwrap();
        assert_eq!(
            json,
            "{\"tank\":3,\"name\":\"bob\",\"loc\":{\"x\":1.0,\"y\":2.0},\
             \"bdir\":{\"x\":0.0,\"y\":-1.0},\"tdir\":{\"x\":0.0,\"y\":-1.0},\
             \"score\":0,\"hp\":3,\"died\":false,\"dc\":false,\"join\":true}"
        );
    }

    #[test]
    fn test_decode_record_by_key_presence() {
        let wall = decode_record(r#"{"wall":2,"p1":{"x":0,"y":0},"p2":{"x":0,"y":10}}"#).unwrap();
        assert!(matches!(wall, WorldRecord::Wall(WallRecord { wall: 2, .. })));

        let power = decode_record(r#"{"power":5,"loc":{"x":1,"y":1},"died":true}"#).unwrap();
        assert!(matches!(power, WorldRecord::Powerup(PowerupRecord { power: 5, died: true, .. })));

        let beam = decode_record(r#"{"beam":1,"org":{"x":0,"y":0},"dir":{"x":1,"y":0},"owner":4}"#).unwrap();
        assert!(matches!(beam, WorldRecord::Beam(BeamRecord { owner: 4, .. })));

        assert!(matches!(decode_record(r#"{"ghost":1}"#), Err(ProtocolError::UnknownRecord)));
        assert!(matches!(decode_record("[1,2]"), Err(ProtocolError::UnknownRecord)));
    }

    #[test]
    fn test_decode_prefers_earlier_key() {
        // A projectile record that also carries "power" still decodes as a projectile
        let line = r#"{"proj":1,"loc":{"x":0,"y":0},"dir":{"x":1,"y":0},"died":false,"owner":2,"power":9}"#;
        assert!(matches!(decode_record(line).unwrap(), WorldRecord::Projectile(_)));
    }

    #[test]
    fn test_handshake_reply() {
        let settings = GameSettings {
            walls: vec![
                WallSpec { p1: Vec2::new(0.0, 0.0), p2: Vec2::new(0.0, 100.0) },
                WallSpec { p1: Vec2::new(50.0, 50.0), p2: Vec2::new(150.0, 50.0) },
            ],
            ..GameSettings::default()
        };
        let world = World::new(&settings, 1);
        let reply = handshake_reply(7, world.universe_size, world.walls.values()).unwrap();

        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "7");
        assert_eq!(lines[1], "2000");
        assert_eq!(
            decode_record(lines[3]).unwrap(),
            WorldRecord::Wall(WallRecord { wall: 1, p1: Vec2::new(50.0, 50.0), p2: Vec2::new(150.0, 50.0) })
        );
        assert!(reply.ends_with('\n'));
    }

    #[test]
    fn test_encode_frame_order() {
        let settings = GameSettings { max_powerups: 0, ..GameSettings::default() };
        let mut world = World::new(&settings, 1);
        world.add_tank(1, "a", &settings);
        world.spawn_projectile(1, Vec2::ZERO, Vec2::UP);
        world.spawn_powerup(Vec2::new(10.0, 10.0));
        world.spawn_beam(1, Vec2::ZERO, Vec2::RIGHT);

        let text = encode_frame(&world).unwrap();
        let kinds: Vec<&str> = text
            .lines()
            .map(|l| match decode_record(l).unwrap() {
                WorldRecord::Tank(_) => "tank",
                WorldRecord::Projectile(_) => "proj",
                WorldRecord::Wall(_) => "wall",
                WorldRecord::Beam(_) => "beam",
                WorldRecord::Powerup(_) => "power",
            })
            .collect();
        assert_eq!(kinds, vec!["tank", "proj", "beam", "power"]);
    }

    #[test]
    fn test_encode_frame_skips_hidden_tanks() {
        let settings = GameSettings::default();
        let mut world = World::new(&settings, 1);
        world.add_tank(1, "a", &settings);
        world.add_tank(2, "b", &settings);
        world.tanks.get_mut(&2).unwrap().lifecycle = crate::game::state::Lifecycle::Removed;
        world.disconnect_tank(1);

        assert_eq!(encode_frame(&world).unwrap(), "");
    }

    #[test]
    fn test_departures_flag_dc() {
        let mut tank = Tank::new(9, "gone", Vec2::ZERO, 3);
        tank.disconnect();
        let text = encode_departures(&[tank]).unwrap();

        match decode_record(text.trim_end()).unwrap() {
            WorldRecord::Tank(r) => {
                assert!(r.dc);
                assert!(r.died);
                assert_eq!(r.hp, 0);
            }
            other => panic!("expected tank record, got {:?}", other),
        }
    }

    #[test]
    fn test_line_buffer_keeps_fragment() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"first\nsec").unwrap();
        assert_eq!(buffer.next_line().as_deref(), Some("first"));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.fragment_len(), 3);

        buffer.push(b"ond\r\n\nthird\n").unwrap();
        assert_eq!(buffer.next_line().as_deref(), Some("second"));
        assert_eq!(buffer.next_line().as_deref(), Some(""));
        assert_eq!(buffer.next_line().as_deref(), Some("third"));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.fragment_len(), 0);
    }

    #[test]
    fn test_line_buffer_rejects_unterminated_flood() {
        let mut buffer = LineBuffer::with_limit(8);
        buffer.push(b"ok\n1234").unwrap();
        buffer.push(b"5678").unwrap();

        let err = buffer.push(b"9").unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { len: 9, max: 8 }));
        assert_eq!(buffer.next_line().as_deref(), Some("ok"));

        // A long line is fine as long as its terminator arrives in time
        let mut buffer = LineBuffer::with_limit(8);
        buffer.push(b"12345678").unwrap();
        buffer.push(b"\n").unwrap();
        assert_eq!(buffer.next_line().as_deref(), Some("12345678"));
    }
}
