//! Head direction bookkeeping
//!
//! The board remembers the last declared direction per axis, so the driver
//! only emits a direction byte when the travel direction differs from what
//! the board already has. That state is kept as a bitmask.

/// Move right, +x
pub(crate) const CODE_RIGHT: &[u8] = b"B";
/// Move left, -x
pub(crate) const CODE_LEFT: &[u8] = b"T";
/// Move top, -y
pub(crate) const CODE_TOP: &[u8] = b"L";
/// Move bottom, +y
pub(crate) const CODE_BOTTOM: &[u8] = b"R";

/// Declared direction bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties(u8);

impl Properties {
    /// Last x travel was towards -x
    pub const LEFTWARD: u8 = 0x01;
    /// Last y travel was towards -y
    pub const TOPWARD: u8 = 0x02;
    /// The x axis is engaged
    pub const X_ENGAGED: u8 = 0x04;
    /// The y axis is engaged
    pub const Y_ENGAGED: u8 = 0x08;
    /// Scanning runs along x
    pub const HORIZONTAL_MAJOR: u8 = 0x10;

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Set every bit in `mask`
    pub fn set(&mut self, mask: u8) {
        self.0 |= mask;
    }

    /// Clear every bit in `mask`
    pub fn unset(&mut self, mask: u8) {
        self.0 &= !mask;
    }

    /// Whether any bit in `mask` is set
    pub fn is(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    /// Flip the bits in `mask` as a group
    pub fn toggle(&mut self, mask: u8) {
        if self.is(mask) {
            self.unset(mask);
        } else {
            self.set(mask);
        }
    }

    /// Set or clear `mask`
    pub fn assign(&mut self, mask: u8, value: bool) {
        if value {
            self.set(mask);
        } else {
            self.unset(mask);
        }
    }

    pub fn leftward(self) -> bool {
        self.is(Self::LEFTWARD)
    }

    pub fn topward(self) -> bool {
        self.is(Self::TOPWARD)
    }

    pub fn x_engaged(self) -> bool {
        self.is(Self::X_ENGAGED)
    }

    pub fn y_engaged(self) -> bool {
        self.is(Self::Y_ENGAGED)
    }

    pub fn horizontal_major(self) -> bool {
        self.is(Self::HORIZONTAL_MAJOR)
    }

    pub fn is_left(self) -> bool {
        self.x_engaged() && !self.y_engaged() && self.leftward()
    }

    pub fn is_right(self) -> bool {
        self.x_engaged() && !self.y_engaged() && !self.leftward()
    }

    pub fn is_top(self) -> bool {
        !self.x_engaged() && self.y_engaged() && self.topward()
    }

    pub fn is_bottom(self) -> bool {
        !self.x_engaged() && self.y_engaged() && !self.topward()
    }

    pub fn is_angle(self) -> bool {
        self.x_engaged() && self.y_engaged()
    }

    /// Engage x alone
    pub fn engage_x(&mut self) {
        self.set(Self::X_ENGAGED);
        self.unset(Self::Y_ENGAGED);
    }

    /// Engage y alone
    pub fn engage_y(&mut self) {
        self.unset(Self::X_ENGAGED);
        self.set(Self::Y_ENGAGED);
    }

    /// Engage both axes for a diagonal
    pub fn engage_both(&mut self) {
        self.set(Self::X_ENGAGED | Self::Y_ENGAGED);
    }

    /// Direction bytes opening a program
    ///
    /// The minor axis is declared first so the major axis ends up engaged.
    pub fn declare(&mut self) -> Vec<u8> {
        let x_dir = if self.leftward() { CODE_LEFT } else { CODE_RIGHT };
        let y_dir = if self.topward() { CODE_TOP } else { CODE_BOTTOM };
        if self.horizontal_major() {
            self.engage_x();
            [y_dir, x_dir].concat()
        } else {
            self.engage_y();
            [x_dir, y_dir].concat()
        }
    }
}

/// Direction requests waiting for the next program entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StagedDirection {
    pub leftward: Option<bool>,
    pub topward: Option<bool>,
    pub horizontal_major: Option<bool>,
}

impl StagedDirection {
    /// Apply and clear every staged request
    pub fn apply_to(&mut self, properties: &mut Properties) {
        if let Some(leftward) = self.leftward.take() {
            properties.assign(Properties::LEFTWARD, leftward);
        }
        if let Some(topward) = self.topward.take() {
            properties.assign(Properties::TOPWARD, topward);
        }
        if let Some(horizontal) = self.horizontal_major.take() {
            properties.assign(Properties::HORIZONTAL_MAJOR, horizontal);
        }
    }

    /// Drop staged requests
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.leftward.is_none() && self.topward.is_none() && self.horizontal_major.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_predicates() {
        let mut props = Properties::default();
        props.engage_x();
        assert!(props.is_right());
        props.set(Properties::LEFTWARD);
        assert!(props.is_left());
        assert!(!props.is_top() && !props.is_bottom());

        props.engage_both();
        assert!(props.is_angle());
        assert!(!props.is_left());
    }

    #[test]
    fn test_declare_orders_minor_axis_first() {
        let mut props = Properties::default();
        props.set(Properties::HORIZONTAL_MAJOR | Properties::TOPWARD);
        assert_eq!(props.declare(), b"LB".to_vec());
        assert!(props.is_right());

        let mut props = Properties::default();
        props.set(Properties::LEFTWARD);
        assert_eq!(props.declare(), b"TR".to_vec());
        assert!(props.is_bottom());
    }

    #[test]
    fn test_toggle() {
        let mut props = Properties::default();
        props.toggle(Properties::LEFTWARD);
        assert!(props.leftward());
        props.toggle(Properties::LEFTWARD);
        assert_eq!(props.bits(), 0);
    }

    #[test]
    fn test_staged_applied_once() {
        let mut props = Properties::default();
        let mut staged = StagedDirection {
            leftward: Some(true),
            topward: None,
            horizontal_major: Some(true),
        };
        staged.apply_to(&mut props);
        assert!(props.leftward() && props.horizontal_major());
        assert!(staged.is_empty());

        props.unset(Properties::LEFTWARD);
        staged.apply_to(&mut props);
        assert!(!props.leftward());
    }
}
