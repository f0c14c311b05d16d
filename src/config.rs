//! Game Settings
//!
//! Tunables and static wall geometry, loaded once at startup from a JSON
//! settings file. Any field left out of the file keeps its default.
//!
//! ```json
//! {
//!   "universe_size": 2000,
//!   "ms_per_frame": 17,
//!   "frames_per_shot": 80,
//!   "respawn_rate": 300,
//!   "bounce_mode": false,
//!   "walls": [
//!     { "p1": { "x": -575, "y": -575 }, "p2": { "x": -575, "y": 575 } }
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// A static wall as written in the settings file.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WallSpec {
    /// First endpoint
    pub p1: Vec2,
    /// Second endpoint
    pub p2: Vec2,
}

impl WallSpec {
    /// Horizontal or vertical segments only.
    pub fn is_axis_aligned(&self) -> bool {
        self.p1.x == self.p2.x || self.p1.y == self.p2.y
    }
}

/// Every tunable the simulation consumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameSettings {
    /// Side length of the square universe; coordinates span ±size/2.
    pub universe_size: u32,
    /// Milliseconds between ticks.
    pub ms_per_frame: u64,
    /// Minimum frames between two main shots of one tank.
    pub frames_per_shot: u64,
    /// Frames a dead tank waits before respawning.
    pub respawn_rate: u64,
    /// Hit points of a fresh tank.
    pub max_hp: u32,
    /// Projectile travel per frame.
    pub projectile_speed: f64,
    /// Tank travel per frame.
    pub tank_speed: f64,
    /// Tank hit-box size; also the hit radius for projectiles and beams.
    pub tank_size: f64,
    /// Wall thickness.
    pub wall_size: f64,
    /// Maximum powerups alive at once.
    pub max_powerups: usize,
    /// Upper bound of the randomized frames between powerup spawns.
    pub max_powerup_delay: u32,
    /// Damage per projectile hit.
    pub projectile_damage: u32,
    /// Damage per beam hit.
    pub beam_damage: u32,
    /// Score for a projectile kill.
    pub projectile_kill_points: u32,
    /// Score for a beam kill.
    pub beam_kill_points: u32,
    /// Projectiles reflect off walls instead of dying.
    pub bounce_mode: bool,
    /// Wall reflections allowed per projectile in bounce mode.
    pub max_bounces: u32,
    /// Static obstacles.
    pub walls: Vec<WallSpec>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            universe_size: 2000,
            ms_per_frame: 17,
            frames_per_shot: 80,
            respawn_rate: 300,
            max_hp: 3,
            projectile_speed: 25.0,
            tank_speed: 3.0,
            tank_size: 60.0,
            wall_size: 50.0,
            max_powerups: 2,
            max_powerup_delay: 1650,
            projectile_damage: 1,
            beam_damage: 3,
            projectile_kill_points: 1,
            beam_kill_points: 2,
            bounce_mode: false,
            max_bounces: 3,
            walls: Vec::new(),
        }
    }
}

/// Settings loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid settings JSON.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// The values parsed but cannot drive a simulation.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl GameSettings {
    /// Load and validate settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: GameSettings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.universe_size == 0 {
            return Err(SettingsError::Invalid("universe_size must be positive".into()));
        }
        if self.ms_per_frame == 0 {
            return Err(SettingsError::Invalid("ms_per_frame must be positive".into()));
        }
        if self.max_hp == 0 {
            return Err(SettingsError::Invalid("max_hp must be positive".into()));
        }
        if self.max_powerup_delay == 0 {
            return Err(SettingsError::Invalid("max_powerup_delay must be positive".into()));
        }
        if !(self.tank_size > 0.0 && self.wall_size >= 0.0) {
            return Err(SettingsError::Invalid("tank_size and wall_size must be positive".into()));
        }
        if !(self.tank_speed.is_finite() && self.projectile_speed.is_finite()) {
            return Err(SettingsError::Invalid("speeds must be finite".into()));
        }
        for (index, wall) in self.walls.iter().enumerate() {
            if !(wall.p1.is_finite() && wall.p2.is_finite()) {
                return Err(SettingsError::Invalid(format!("wall {} has a non-finite endpoint", index)));
            }
            if !wall.is_axis_aligned() {
                return Err(SettingsError::Invalid(format!(
                    "wall {} from {} to {} is neither horizontal nor vertical",
                    index, wall.p1, wall.p2
                )));
            }
        }
        Ok(())
    }

    /// Tick period.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.ms_per_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GameSettings::default();
        assert_eq!(settings.max_hp, 3);
        assert_eq!(settings.projectile_speed, 25.0);
        assert_eq!(settings.tank_size, 60.0);
        assert_eq!(settings.max_bounces, 3);
        assert!(!settings.bounce_mode);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = GameSettings::from_json(
            r#"{
                "universe_size": 1200,
                "ms_per_frame": 20,
                "bounce_mode": true,
                "walls": [ { "p1": {"x": 0, "y": -100}, "p2": {"x": 0, "y": 100} } ]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.universe_size, 1200);
        assert_eq!(settings.frame_duration(), Duration::from_millis(20));
        assert!(settings.bounce_mode);
        assert_eq!(settings.walls.len(), 1);
        assert_eq!(settings.max_powerups, 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = GameSettings::from_json(r#"{ "gravity": 9.8 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn test_diagonal_wall_rejected() {
        let err = GameSettings::from_json(
            r#"{ "walls": [ { "p1": {"x": 0, "y": 0}, "p2": {"x": 10, "y": 10} } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let err = GameSettings::from_json(r#"{ "ms_per_frame": 0 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_zero_max_hp_rejected() {
        let err = GameSettings::from_json(r#"{ "max_hp": 0 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let settings = GameSettings { max_hp: 0, respawn_rate: 2, ..GameSettings::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = GameSettings::from_file("/definitely/not/here/settings.json").unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }
}
