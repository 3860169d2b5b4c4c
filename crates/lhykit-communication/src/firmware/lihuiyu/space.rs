//! Physical to device coordinate conversion

use lhykit_core::units::mm_to_native;
use lhykit_core::NativePosition;
use lhykit_settings::DeviceConfig;

/// Maps millimetre coordinates onto native board units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSpace {
    /// Native units per millimetre
    pub units_per_mm: f64,
    /// Mirror the x axis about the origin
    pub flip_x: bool,
    /// Mirror the y axis about the origin
    pub flip_y: bool,
}

impl DeviceSpace {
    /// Space described by the device configuration
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            units_per_mm: config.native_units_per_mm,
            flip_x: config.flip_x,
            flip_y: config.flip_y,
        }
    }

    /// Device position of a physical point
    pub fn physical_to_device_position(&self, x_mm: f64, y_mm: f64) -> NativePosition {
        let (x, y) = self.physical_to_device_length(x_mm, y_mm);
        NativePosition::new(x, y)
    }

    /// Device delta of a physical displacement
    pub fn physical_to_device_length(&self, dx_mm: f64, dy_mm: f64) -> (i64, i64) {
        let dx = mm_to_native(dx_mm, self.units_per_mm).round() as i64;
        let dy = mm_to_native(dy_mm, self.units_per_mm).round() as i64;
        (
            if self.flip_x { -dx } else { dx },
            if self.flip_y { -dy } else { dy },
        )
    }
}

impl Default for DeviceSpace {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}
