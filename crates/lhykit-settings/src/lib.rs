//! LhyKit Settings Crate
//!
//! Handles device configuration and its persistence.

pub mod config;
pub mod error;

pub use config::{DeviceConfig, JogMode};
pub use error::{ConfigError, SettingsError, SettingsResult};
