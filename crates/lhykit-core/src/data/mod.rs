//! Data models shared by the planner and the driver
//!
//! This module provides:
//! - Driver mode representation
//! - Native (device unit) positions
//! - Laser settings snapshots attached to cut primitives

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode of the Lihuiyu driver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriverMode {
    /// Idle or manual positioning; every move is a self-contained command.
    #[default]
    Rapid,
    /// Vector cutting inside a declared program.
    Program,
    /// Bitmap stepping inside a declared program.
    Raster,
    /// Program closed, buffer flushed.
    Finish,
    /// Settings changed mid-program; resolved by re-entering Program or Raster.
    ModeChange,
}

impl DriverMode {
    /// Whether the head is inside a declared program (Program or Raster)
    pub fn is_programmed(self) -> bool {
        matches!(self, DriverMode::Program | DriverMode::Raster)
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverMode::Rapid => write!(f, "Rapid"),
            DriverMode::Program => write!(f, "Program"),
            DriverMode::Raster => write!(f, "Raster"),
            DriverMode::Finish => write!(f, "Finish"),
            DriverMode::ModeChange => write!(f, "ModeChange"),
        }
    }
}

/// Head position in native device units (mils on stock boards)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NativePosition {
    /// X position
    pub x: i64,
    /// Y position, growing towards the bottom of the bed
    pub y: i64,
}

impl NativePosition {
    /// Create a new position
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for NativePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i64, i64)> for NativePosition {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

/// Laser settings snapshot attached to a cut primitive
///
/// Created by the operation layer and shared read-only with the planner.
/// The driver keeps its own working copy to detect deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserSettings {
    /// Pulse density, 0 (never fire) to 1000 (fire every step).
    pub power: f64,
    /// Head speed in mm/s.
    pub speed: f64,
    /// Raster step along x in device units; may be fractional.
    pub raster_step_x: f64,
    /// Raster step along y in device units; may be fractional.
    pub raster_step_y: f64,
    /// Explicit acceleration level, `None` lets the speed code pick one.
    pub acceleration: Option<u8>,
    /// Explicit diagonal ratio, `None` uses the board default.
    pub d_ratio: Option<f64>,
    /// Extra off-travel past the end of each raster scan line.
    pub overscan: i64,
    /// Pulse frequency in kHz where the board supports it.
    pub frequency: Option<f64>,
    /// Never emit two consecutive moves with the same x.
    pub constant_move_x: bool,
    /// Never emit two consecutive moves with the same y.
    pub constant_move_y: bool,
    /// Raster with explicit NSE steps instead of board auto-stepping.
    pub raster_alt: bool,
    /// Unidirectional raster: every scan line runs the same way and the
    /// return travel is made with the laser off.
    pub raster_swing: bool,
    /// Request the twitchless speed-code suffix even when twitches are on.
    pub force_twitchless: bool,
    /// Allow short repositions to be jogged instead of rapid-moved.
    pub jog_enable: bool,
    /// Longest reposition, in device units, that may be jogged.
    pub jog_distance: i64,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            power: 1000.0,
            speed: 20.0,
            raster_step_x: 0.0,
            raster_step_y: 0.0,
            acceleration: None,
            d_ratio: None,
            overscan: 0,
            frequency: None,
            constant_move_x: false,
            constant_move_y: false,
            raster_alt: false,
            raster_swing: false,
            force_twitchless: false,
            jog_enable: true,
            jog_distance: 255,
        }
    }
}

impl LaserSettings {
    /// Create settings with the given power and defaults elsewhere
    pub fn with_power(power: f64) -> Self {
        Self {
            power,
            ..Self::default()
        }
    }

    /// Create vector settings at the given speed
    pub fn with_speed(speed: f64) -> Self {
        Self {
            speed,
            ..Self::default()
        }
    }

    /// Whether any raster step is configured
    pub fn is_raster(&self) -> bool {
        self.raster_step_x != 0.0 || self.raster_step_y != 0.0
    }

    /// Distance between consecutive scan lines of a raster
    ///
    /// Lines of a horizontal raster advance along y, lines of a vertical one
    /// along x. A raster that only sets the other axis's step uses that one.
    pub fn line_step(&self, horizontal: bool) -> f64 {
        let (across, along) = if horizontal {
            (self.raster_step_y, self.raster_step_x)
        } else {
            (self.raster_step_x, self.raster_step_y)
        };
        if across != 0.0 {
            across
        } else {
            along
        }
    }

    /// Whether switching from `self` to `other` requires re-entering program mode
    pub fn requires_mode_change(&self, other: &LaserSettings) -> bool {
        self.power != other.power
            || self.raster_step_x != other.raster_step_x
            || self.raster_step_y != other.raster_step_y
            || self.speed != other.speed
            || self.d_ratio != other.d_ratio
            || self.acceleration != other.acceleration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_change_fields() {
        let base = LaserSettings::default();
        assert!(!base.requires_mode_change(&base.clone()));

        let faster = LaserSettings::with_speed(40.0);
        assert!(base.requires_mode_change(&faster));

        let weaker = LaserSettings::with_power(500.0);
        assert!(base.requires_mode_change(&weaker));

        let smoother = LaserSettings {
            constant_move_x: true,
            overscan: 20,
            ..LaserSettings::default()
        };
        assert!(!base.requires_mode_change(&smoother));
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: LaserSettings =
            serde_json::from_str(r#"{"speed": 35.0, "raster_step_y": 2.5}"#).unwrap();
        assert_eq!(settings.speed, 35.0);
        assert_eq!(settings.raster_step_y, 2.5);
        assert_eq!(settings.power, 1000.0);
        assert!(settings.is_raster());
        assert!(!settings.raster_swing);
    }

    #[test]
    fn test_line_step_falls_back_to_other_axis() {
        let settings = LaserSettings {
            raster_step_y: 2.0,
            ..LaserSettings::default()
        };
        assert_eq!(settings.line_step(true), 2.0);
        assert_eq!(settings.line_step(false), 2.0);

        let both = LaserSettings {
            raster_step_x: 3.0,
            ..settings
        };
        assert_eq!(both.line_step(true), 2.0);
        assert_eq!(both.line_step(false), 3.0);
        assert_eq!(LaserSettings::default().line_step(true), 0.0);
    }
}
