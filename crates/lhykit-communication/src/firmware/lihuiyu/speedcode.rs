//! Speed code seam
//!
//! Program entry starts with a speed declaration computed from the board,
//! the speed and the raster step. The lookup itself lives outside the driver
//! behind [`SpeedCodeProvider`].

/// Parameters of one speed declaration
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedCodeRequest {
    /// Board identifier
    pub board: String,
    /// Head speed in mm/s
    pub speed: f64,
    /// Raster step the firmware should apply, 0 for none
    pub step: i64,
    /// Diagonal ratio override
    pub d_ratio: Option<f64>,
    /// Acceleration level override
    pub acceleration: Option<u8>,
    /// Request the twitchless `C` suffix
    pub suffix_c: bool,
    /// Use exact rather than rounded speeds
    pub fix_speeds: bool,
    /// Raster lines run horizontally
    pub raster_horizontal: bool,
}

/// Computes the speed declaration bytes
pub trait SpeedCodeProvider: Send {
    /// Bytes opening a program with the requested parameters
    fn speed_code(&self, request: &SpeedCodeRequest) -> Vec<u8>;
}

/// Provider returning a precomputed vector code
///
/// Raster steps are appended as `G` plus a three digit step, and the
/// twitchless suffix as a trailing `C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSpeedCode {
    code: String,
}

impl StaticSpeedCode {
    /// Provider answering every request with `code`
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl Default for StaticSpeedCode {
    fn default() -> Self {
        // 20 mm/s on an M2 board.
        Self::new("CV2352492000000")
    }
}

impl SpeedCodeProvider for StaticSpeedCode {
    fn speed_code(&self, request: &SpeedCodeRequest) -> Vec<u8> {
        let mut code = self.code.clone();
        if request.step != 0 {
            code.push_str(&format!("G{:03}", request.step.unsigned_abs()));
        }
        if request.suffix_c {
            code.push('C');
        }
        code.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(step: i64, suffix_c: bool) -> SpeedCodeRequest {
        SpeedCodeRequest {
            board: "M2".to_string(),
            speed: 20.0,
            step,
            d_ratio: None,
            acceleration: None,
            suffix_c,
            fix_speeds: false,
            raster_horizontal: true,
        }
    }

    #[test]
    fn test_static_code_suffixes() {
        let provider = StaticSpeedCode::new("CV1");
        assert_eq!(provider.speed_code(&request(0, false)), b"CV1".to_vec());
        assert_eq!(provider.speed_code(&request(0, true)), b"CV1C".to_vec());
        assert_eq!(provider.speed_code(&request(2, false)), b"CV1G002".to_vec());
    }
}
