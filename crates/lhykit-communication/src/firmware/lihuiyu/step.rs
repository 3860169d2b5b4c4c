//! Fractional raster step accumulation

/// Carries the fractional part of raster steps between line switches
///
/// Each switch adds the requested delta and takes the whole part, so over
/// many switches the applied total never drifts more than one unit from the
/// requested total.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepAccumulator {
    total: f64,
}

impl StepAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` and take the whole units, truncated towards zero
    pub fn advance(&mut self, delta: f64) -> i64 {
        self.total += delta;
        let whole = self.total.trunc();
        self.total -= whole;
        whole as i64
    }

    /// Fraction carried to the next switch
    pub fn remainder(&self) -> f64 {
        self.total
    }

    pub fn reset(&mut self) {
        self.total = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_carries_fraction() {
        let mut acc = StepAccumulator::new();
        assert_eq!(acc.advance(1.5), 1);
        assert_eq!(acc.advance(1.5), 2);
        assert_eq!(acc.remainder(), 0.0);
        assert_eq!(acc.advance(-0.5), 0);
        assert_eq!(acc.advance(-0.75), -1);
    }

    proptest! {
        #[test]
        fn prop_drift_bounded(pitch in 0.05f64..8.0, count in 1usize..400) {
            let mut acc = StepAccumulator::new();
            let applied: i64 = (0..count).map(|_| acc.advance(pitch)).sum();
            let requested = (count as f64 * pitch).round() as i64;
            prop_assert!((applied - requested).abs() <= 1);
        }

        #[test]
        fn prop_negative_pitch(pitch in -8.0f64..-0.05, count in 1usize..400) {
            let mut acc = StepAccumulator::new();
            let applied: i64 = (0..count).map(|_| acc.advance(pitch)).sum();
            let requested = (count as f64 * pitch).round() as i64;
            prop_assert!((applied - requested).abs() <= 1);
        }
    }
}
