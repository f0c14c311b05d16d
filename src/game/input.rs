//! Control Commands and Command Intake
//!
//! A connection writes validated commands into its own intake slot; the
//! tick drains every slot once. Newer commands overwrite older ones that
//! the tick has not consumed yet (last write wins, no queueing).

use std::collections::BTreeMap;

use crate::core::vec2::Vec2;
use crate::game::state::EntityId;

// =============================================================================
// COMMAND TYPES
// =============================================================================

/// Requested movement direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Movement {
    /// Stand still, keep the current orientation
    #[default]
    None,
    /// Toward -Y
    Up,
    /// Toward -X
    Left,
    /// Toward +Y
    Down,
    /// Toward +X
    Right,
}

impl Movement {
    /// Parse the wire spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Movement::None),
            "up" => Some(Movement::Up),
            "left" => Some(Movement::Left),
            "down" => Some(Movement::Down),
            "right" => Some(Movement::Right),
            _ => None,
        }
    }

    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Movement::None => "none",
            Movement::Up => "up",
            Movement::Left => "left",
            Movement::Down => "down",
            Movement::Right => "right",
        }
    }

    /// Unit direction, or `None` when standing still.
    #[inline]
    pub fn direction(self) -> Option<Vec2> {
        match self {
            Movement::None => None,
            Movement::Up => Some(Vec2::UP),
            Movement::Left => Some(Vec2::LEFT),
            Movement::Down => Some(Vec2::DOWN),
            Movement::Right => Some(Vec2::RIGHT),
        }
    }
}

/// Requested weapon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FireMode {
    /// Hold fire
    #[default]
    None,
    /// Main gun (projectile, cooldown-limited)
    Main,
    /// Beam (consumes one charge)
    Alt,
}

impl FireMode {
    /// Parse the wire spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(FireMode::None),
            "main" => Some(FireMode::Main),
            "alt" => Some(FireMode::Alt),
            _ => None,
        }
    }

    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            FireMode::None => "none",
            FireMode::Main => "main",
            FireMode::Alt => "alt",
        }
    }
}

/// One validated control command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlCommand {
    /// Movement request
    pub moving: Movement,
    /// Fire request
    pub fire: FireMode,
    /// Turret aim, expected pre-normalized by the sender
    pub aim: Vec2,
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self {
            moving: Movement::None,
            fire: FireMode::None,
            aim: Vec2::UP,
        }
    }
}

impl ControlCommand {
    /// Create a command.
    pub const fn new(moving: Movement, fire: FireMode, aim: Vec2) -> Self {
        Self { moving, fire, aim }
    }
}

// =============================================================================
// COMMAND INTAKE
// =============================================================================

/// Most recent unconsumed command per tank.
#[derive(Debug, Default)]
pub struct CommandIntake {
    slots: BTreeMap<EntityId, ControlCommand>,
}

impl CommandIntake {
    /// Create an empty intake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a command, replacing any the tick has not consumed yet.
    pub fn submit(&mut self, id: EntityId, command: ControlCommand) {
        self.slots.insert(id, command);
    }

    /// Drop a slot so nothing more from that connection is applied.
    pub fn forget(&mut self, id: EntityId) {
        self.slots.remove(&id);
    }

    /// Take every pending command, leaving the intake empty.
    pub fn drain(&mut self) -> BTreeMap<EntityId, ControlCommand> {
        std::mem::take(&mut self.slots)
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no command is pending.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_parse_roundtrip() {
        for m in [Movement::None, Movement::Up, Movement::Left, Movement::Down, Movement::Right] {
            assert_eq!(Movement::parse(m.as_str()), Some(m));
        }
        assert_eq!(Movement::parse("sideways"), None);
        assert_eq!(Movement::parse("UP"), None);
    }

    #[test]
    fn test_fire_parse() {
        assert_eq!(FireMode::parse("main"), Some(FireMode::Main));
        assert_eq!(FireMode::parse("alt"), Some(FireMode::Alt));
        assert_eq!(FireMode::parse("none"), Some(FireMode::None));
        assert_eq!(FireMode::parse("nuke"), None);
    }

    #[test]
    fn test_movement_directions() {
        assert_eq!(Movement::Up.direction(), Some(Vec2::new(0.0, -1.0)));
        assert_eq!(Movement::Left.direction(), Some(Vec2::new(-1.0, 0.0)));
        assert_eq!(Movement::Right.direction(), Some(Vec2::new(1.0, 0.0)));
        assert_eq!(Movement::Down.direction(), Some(Vec2::new(0.0, 1.0)));
        assert_eq!(Movement::None.direction(), None);
    }

    #[test]
    fn test_intake_last_write_wins() {
        let mut intake = CommandIntake::new();
        intake.submit(1, ControlCommand::new(Movement::Up, FireMode::None, Vec2::UP));
        intake.submit(1, ControlCommand::new(Movement::Left, FireMode::Main, Vec2::LEFT));
        intake.submit(2, ControlCommand::default());

        assert_eq!(intake.len(), 2);

        let drained = intake.drain();
        assert_eq!(drained[&1].moving, Movement::Left);
        assert_eq!(drained[&1].fire, FireMode::Main);
        assert!(intake.is_empty());
    }

    #[test]
    fn test_intake_forget() {
        let mut intake = CommandIntake::new();
        intake.submit(1, ControlCommand::default());
        intake.forget(1);
        intake.forget(99);
        assert!(intake.drain().is_empty());
    }
}
