//! Cut primitives
//!
//! A job reaches the planner as a sequence of [`CutPrimitive`]s. Geometric
//! primitives carry a shared settings snapshot and a pass count; the
//! remaining variants are device actions the driver performs directly.
//! Coordinates are signed device units.

use crate::raster::RasterWalk;
use lhykit_core::{LaserSettings, NativePosition, PlannerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Axis a primitive is dominated by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MajorAxis {
    /// X dominant, horizontal scanning
    Horizontal,
    /// Y dominant, vertical scanning
    Vertical,
}

impl MajorAxis {
    /// Value carried by an axis declaration event
    pub fn code(self) -> i64 {
        match self {
            MajorAxis::Horizontal => 0,
            MajorAxis::Vertical => 1,
        }
    }
}

/// Settings and repeat count shared by geometric primitives
#[derive(Debug, Clone, PartialEq)]
pub struct CutCommon {
    /// Settings snapshot, shared read-only
    pub settings: Arc<LaserSettings>,
    /// Number of times the primitive is run
    pub passes: u32,
}

impl CutCommon {
    /// Single pass with the given settings
    pub fn new(settings: Arc<LaserSettings>) -> Self {
        Self {
            settings,
            passes: 1,
        }
    }

    /// Builder-style pass count
    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes.max(1);
        self
    }
}

/// A vertex of an explicit plot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotPoint {
    /// Vertex position
    pub position: NativePosition,
    /// Laser state while travelling to this vertex
    pub on: bool,
}

impl PlotPoint {
    /// Create a vertex
    pub fn new(x: i64, y: i64, on: bool) -> Self {
        Self {
            position: NativePosition::new(x, y),
            on,
        }
    }
}

/// Side raster lines advance towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterDirection {
    /// Horizontal lines, advancing down the bed
    #[default]
    TopToBottom,
    /// Horizontal lines, advancing up the bed
    BottomToTop,
    /// Vertical columns, advancing right
    LeftToRight,
    /// Vertical columns, advancing left
    RightToLeft,
}

impl RasterDirection {
    /// Whether scan lines run along x
    pub fn is_horizontal(self) -> bool {
        matches!(
            self,
            RasterDirection::TopToBottom | RasterDirection::BottomToTop
        )
    }

    /// Whether lines advance towards increasing row or column index
    pub fn advances_forward(self) -> bool {
        matches!(
            self,
            RasterDirection::TopToBottom | RasterDirection::LeftToRight
        )
    }

    /// Direction paired with this one in a crosshatch
    pub fn crossed(self) -> Self {
        match self {
            RasterDirection::TopToBottom => RasterDirection::LeftToRight,
            RasterDirection::BottomToTop => RasterDirection::RightToLeft,
            RasterDirection::LeftToRight => RasterDirection::TopToBottom,
            RasterDirection::RightToLeft => RasterDirection::BottomToTop,
        }
    }
}

/// Grayscale raster image, row-major, 255 is blank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap a pixel buffer
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, PlannerError> {
        if width == 0 || height == 0 {
            return Err(PlannerError::EmptyImage);
        }
        let expected = width * height;
        if pixels.len() != expected {
            return Err(PlannerError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel value at (column, row)
    pub fn pixel(&self, column: usize, row: usize) -> u8 {
        self.pixels[row * self.width + column]
    }

    /// Whether the pixel fires the laser
    pub fn is_dark(&self, column: usize, row: usize) -> bool {
        self.pixel(column, row) != 255
    }
}

/// Cut primitive
#[derive(Debug, Clone, PartialEq)]
pub enum CutPrimitive {
    /// Straight cut
    Line {
        start: NativePosition,
        end: NativePosition,
        common: CutCommon,
    },
    /// Quadratic Bézier cut
    Quad {
        start: NativePosition,
        control: NativePosition,
        end: NativePosition,
        common: CutCommon,
    },
    /// Cubic Bézier cut
    Cubic {
        start: NativePosition,
        control1: NativePosition,
        control2: NativePosition,
        end: NativePosition,
        common: CutCommon,
    },
    /// Explicit vertex list, the first vertex is the start
    Plot {
        points: Vec<PlotPoint>,
        common: CutCommon,
    },
    /// Bitmap engraving anchored at `origin`
    Raster {
        origin: NativePosition,
        image: Arc<RasterImage>,
        direction: RasterDirection,
        crosshatch: bool,
        common: CutCommon,
    },
    /// Fire the laser in place for `dwell_time_ms`
    Dwell {
        start: NativePosition,
        dwell_time_ms: u64,
    },
    /// Pause the job for `dwell_time_ms`
    Wait { dwell_time_ms: u64 },
    /// Home the head
    Home,
    /// Move to `start` relative to the origin
    Goto { start: NativePosition },
    /// Wait on an input line
    Input { mask: u32, value: u32 },
    /// Set an output line
    Output { mask: u32, value: u32 },
    /// Set the origin to `start`, or to the current head position
    SetOrigin {
        start: Option<NativePosition>,
        set_current: bool,
    },
}

impl CutPrimitive {
    /// Straight cut with default settings handling
    pub fn line(start: NativePosition, end: NativePosition, settings: Arc<LaserSettings>) -> Self {
        CutPrimitive::Line {
            start,
            end,
            common: CutCommon::new(settings),
        }
    }

    /// Raster cut without crosshatch
    pub fn raster(
        origin: NativePosition,
        image: RasterImage,
        direction: RasterDirection,
        settings: Arc<LaserSettings>,
    ) -> Self {
        CutPrimitive::Raster {
            origin,
            image: Arc::new(image),
            direction,
            crosshatch: false,
            common: CutCommon::new(settings),
        }
    }

    /// Shared settings of geometric primitives
    pub fn common(&self) -> Option<&CutCommon> {
        match self {
            CutPrimitive::Line { common, .. }
            | CutPrimitive::Quad { common, .. }
            | CutPrimitive::Cubic { common, .. }
            | CutPrimitive::Plot { common, .. }
            | CutPrimitive::Raster { common, .. } => Some(common),
            _ => None,
        }
    }

    fn common_mut(&mut self) -> Option<&mut CutCommon> {
        match self {
            CutPrimitive::Line { common, .. }
            | CutPrimitive::Quad { common, .. }
            | CutPrimitive::Cubic { common, .. }
            | CutPrimitive::Plot { common, .. }
            | CutPrimitive::Raster { common, .. } => Some(common),
            _ => None,
        }
    }

    /// Settings snapshot, if the primitive has one
    pub fn settings(&self) -> Option<&Arc<LaserSettings>> {
        self.common().map(|common| &common.settings)
    }

    /// Remaining pass count
    pub fn passes(&self) -> u32 {
        self.common().map_or(1, |common| common.passes)
    }

    /// Copy of this primitive with a different pass count
    pub fn with_passes(&self, passes: u32) -> Self {
        let mut copy = self.clone();
        if let Some(common) = copy.common_mut() {
            common.passes = passes.max(1);
        }
        copy
    }

    /// Whether the planner turns this primitive into geometry events
    pub fn is_geometric(&self) -> bool {
        self.common().is_some()
    }

    /// Start position in device units
    pub fn start(&self) -> Option<NativePosition> {
        match self {
            CutPrimitive::Line { start, .. }
            | CutPrimitive::Quad { start, .. }
            | CutPrimitive::Cubic { start, .. }
            | CutPrimitive::Dwell { start, .. }
            | CutPrimitive::Goto { start } => Some(*start),
            CutPrimitive::Plot { points, .. } => points.first().map(|p| p.position),
            CutPrimitive::Raster { .. } => RasterWalk::from_cut(self).map(|walk| walk.start()),
            CutPrimitive::Home => Some(NativePosition::default()),
            CutPrimitive::SetOrigin { start, .. } => *start,
            CutPrimitive::Wait { .. } | CutPrimitive::Input { .. } | CutPrimitive::Output { .. } => {
                None
            }
        }
    }

    /// End position in device units
    pub fn end(&self) -> Option<NativePosition> {
        match self {
            CutPrimitive::Line { end, .. }
            | CutPrimitive::Quad { end, .. }
            | CutPrimitive::Cubic { end, .. } => Some(*end),
            CutPrimitive::Plot { points, .. } => points.last().map(|p| p.position),
            CutPrimitive::Raster { .. } => RasterWalk::from_cut(self).map(|walk| walk.end()),
            _ => self.start(),
        }
    }

    /// Dominant axis of the primitive
    pub fn major_axis(&self) -> MajorAxis {
        if let CutPrimitive::Raster { direction, .. } = self {
            return if direction.is_horizontal() {
                MajorAxis::Horizontal
            } else {
                MajorAxis::Vertical
            };
        }
        match (self.start(), self.end()) {
            (Some(start), Some(end)) if (end.x - start.x).abs() > (end.y - start.y).abs() => {
                MajorAxis::Horizontal
            }
            _ => MajorAxis::Vertical,
        }
    }

    /// Initial x travel, `1` towards +x and `-1` otherwise
    pub fn x_dir(&self) -> i64 {
        match self {
            CutPrimitive::Raster { direction, .. } => match direction {
                RasterDirection::RightToLeft => -1,
                _ => 1,
            },
            _ => match (self.start(), self.end()) {
                (Some(start), Some(end)) if end.x < start.x => -1,
                _ => 1,
            },
        }
    }

    /// Initial y travel, `1` towards +y and `-1` otherwise
    pub fn y_dir(&self) -> i64 {
        match self {
            CutPrimitive::Raster { direction, .. } => match direction {
                RasterDirection::BottomToTop => -1,
                _ => 1,
            },
            _ => match (self.start(), self.end()) {
                (Some(start), Some(end)) if end.y < start.y => -1,
                _ => 1,
            },
        }
    }
}
