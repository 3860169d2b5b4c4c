//! Device configuration for LhyKit
//!
//! Holds the service-context values the Lihuiyu driver consults while it
//! runs: buffer limits, rail locking, twitch handling, rapid override, jog
//! strategy and the native scale of the board.
//! Supports JSON and TOML file formats stored in platform-specific directories.

use crate::error::{ConfigError, SettingsError, SettingsResult};
use lhykit_core::units::MILS_PER_MM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a reposition jog is performed while a program is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JogMode {
    /// Temporary rapid inside the program using an `N..SE` sequence.
    #[default]
    Nse,
    /// Leave the program with `@NSE` and re-enter it at the new position.
    ModeShift,
    /// Finish the program, rapid-move, then re-enter program mode.
    FinishOut,
}

impl std::fmt::Display for JogMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nse => write!(f, "nse"),
            Self::ModeShift => write!(f, "mode_shift"),
            Self::FinishOut => write!(f, "finish_out"),
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Board identifier handed to the speed-code provider (`M2`, `M3`, `B2`...)
    pub board: String,
    /// Leave the rail locked after rapid moves
    pub autolock: bool,
    /// Board twitches between program commands; disables the twitchless suffix
    pub twitches: bool,
    /// Hold work while the output buffer is over `buffer_max`
    pub buffer_limit: bool,
    /// Buffered byte count above which background work holds
    pub buffer_max: usize,
    /// Perform rapid moves as programmed moves at a fixed speed
    pub rapid_override: bool,
    /// Override speed along x in mm/s
    pub rapid_override_speed_x: f64,
    /// Override speed along y in mm/s
    pub rapid_override_speed_y: f64,
    /// Jog strategy used for short repositions inside a program
    pub opt_jog_mode: JogMode,
    /// Step rasters with explicit NSE commands
    pub nse_raster: bool,
    /// Keep the firmware step set while NSE rastering
    pub nse_stepraster: bool,
    /// Reset direction flags at every program entry
    pub strict: bool,
    /// Ask the speed-code provider for exact rather than rounded speeds
    pub fix_speeds: bool,
    /// Native units per millimetre
    pub native_units_per_mm: f64,
    /// Mirror the x axis
    pub flip_x: bool,
    /// Mirror the y axis
    pub flip_y: bool,
    /// Sleep between hold checks, in milliseconds
    pub hold_poll_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            board: "M2".to_string(),
            autolock: true,
            twitches: false,
            buffer_limit: true,
            buffer_max: 900,
            rapid_override: false,
            rapid_override_speed_x: 50.0,
            rapid_override_speed_y: 50.0,
            opt_jog_mode: JogMode::default(),
            nse_raster: false,
            nse_stepraster: false,
            strict: false,
            fix_speeds: false,
            native_units_per_mm: MILS_PER_MM,
            flip_x: false,
            flip_y: false,
            hold_poll_interval_ms: 50,
        }
    }
}

impl DeviceConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config location, `<config dir>/lhykit/device.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        let mut path = dirs::config_dir().ok_or_else(|| {
            SettingsError::ConfigDirectory("no configuration directory on this platform".into())
        })?;
        path.push("lhykit");
        path.push("device.toml");
        Ok(path)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded device config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    ///
    /// Missing parent directories are created.
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| SettingsError::SaveError(e.to_string()))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;

        tracing::debug!("Saved device config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_limit && self.buffer_max == 0 {
            return Err(out_of_range("buffer_max", self.buffer_max));
        }

        if self.native_units_per_mm.is_nan() || self.native_units_per_mm <= 0.0 {
            return Err(out_of_range(
                "native_units_per_mm",
                self.native_units_per_mm,
            ));
        }

        if self.hold_poll_interval_ms == 0 {
            return Err(out_of_range(
                "hold_poll_interval_ms",
                self.hold_poll_interval_ms,
            ));
        }

        if self.rapid_override_speed_x.is_nan() || self.rapid_override_speed_x <= 0.0 {
            return Err(out_of_range(
                "rapid_override_speed_x",
                self.rapid_override_speed_x,
            ));
        }

        if self.rapid_override_speed_y.is_nan() || self.rapid_override_speed_y <= 0.0 {
            return Err(out_of_range(
                "rapid_override_speed_y",
                self.rapid_override_speed_y,
            ));
        }

        if self.board.trim().is_empty() {
            return Err(ConfigError::MissingKey("board".to_string()));
        }

        Ok(())
    }
}

fn out_of_range(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
}

enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_max, 900);
        assert_eq!(config.opt_jog_mode, JogMode::Nse);
        assert!(config.autolock);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = DeviceConfig {
            buffer_max: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));

        // An unlimited buffer does not need a maximum.
        let config = DeviceConfig {
            buffer_max: 0,
            buffer_limit: false,
            ..DeviceConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = DeviceConfig {
            native_units_per_mm: f64::NAN,
            ..DeviceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DeviceConfig {
            rapid_override_speed_x: f64::NAN,
            ..DeviceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { ref key, .. }) if key == "rapid_override_speed_x"
        ));

        let config = DeviceConfig {
            rapid_override_speed_y: f64::NAN,
            ..DeviceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { ref key, .. }) if key == "rapid_override_speed_y"
        ));

        let config = DeviceConfig {
            board: " ".to_string(),
            ..DeviceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKey(_))
        ));
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("device.toml");

        let config = DeviceConfig {
            board: "B2".to_string(),
            opt_jog_mode: JogMode::ModeShift,
            rapid_override: true,
            ..DeviceConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = DeviceConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.json");

        let config = DeviceConfig {
            twitches: true,
            buffer_max: 1200,
            ..DeviceConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = DeviceConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.toml");
        std::fs::write(&path, "board = \"M3\"\nopt_jog_mode = \"finish_out\"\n").unwrap();

        let loaded = DeviceConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.board, "M3");
        assert_eq!(loaded.opt_jog_mode, JogMode::FinishOut);
        assert_eq!(loaded.hold_poll_interval_ms, 50);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.yaml");

        let err = DeviceConfig::default().save_to_file(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"hold_poll_interval_ms": 0}"#).unwrap();

        assert!(DeviceConfig::load_from_file(&path).is_err());
    }
}
