//! Unit conversion utilities
//!
//! Handles conversion between millimetres and the native step units of
//! Lihuiyu boards, which count mils (1/1000 inch).

/// Native units per millimetre on a stock 1000 dpi board
pub const MILS_PER_MM: f64 = 39.3701;

/// Convert millimetres into native units at the given resolution
pub fn mm_to_native(value_mm: f64, units_per_mm: f64) -> f64 {
    value_mm * units_per_mm
}

/// Convert native units back into millimetres
pub fn native_to_mm(value: f64, units_per_mm: f64) -> f64 {
    if units_per_mm == 0.0 {
        return 0.0;
    }
    value / units_per_mm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_conversion() {
        let native = mm_to_native(25.4, MILS_PER_MM);
        assert!((native - 1000.0).abs() < 0.01);
        assert!((native_to_mm(native, MILS_PER_MM) - 25.4).abs() < 1e-9);
        assert_eq!(native_to_mm(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_round_inch() {
        let native = mm_to_native(12.7, MILS_PER_MM).round() as i64;
        assert_eq!(native, 500);
    }
}
