//! Raster scan line generation
//!
//! A raster primitive is walked line by line. Each line is trimmed to its
//! first and last dark pixel, blank lines are skipped, and consecutive lines
//! run in opposite directions unless the raster swings one way only. Every
//! line produces one move per run of equal pixels, carrying the run's laser
//! state, followed by an optional overscan move with the laser off. The move
//! onto the next line goes straight to that line's entry point.

use crate::cutcode::{CutPrimitive, RasterImage};
use crate::plotter::Step;
use lhykit_core::{BoxedIterator, NativePosition};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct ScanLine {
    /// Row (horizontal) or column (vertical) index in the image
    index: usize,
    first: usize,
    last: usize,
    forward: bool,
}

/// Lazy walk over the moves of a raster primitive
#[derive(Debug, Clone)]
pub struct RasterWalk {
    image: Arc<RasterImage>,
    origin: NativePosition,
    horizontal: bool,
    pitch_along: f64,
    pitch_across: f64,
    overscan: i64,
    lines: Vec<ScanLine>,
    line: usize,
    buffer: VecDeque<Step>,
}

impl RasterWalk {
    /// Build the walk for a raster primitive
    pub fn from_cut(cut: &CutPrimitive) -> Option<Self> {
        let CutPrimitive::Raster {
            origin,
            image,
            direction,
            common,
            ..
        } = cut
        else {
            return None;
        };
        let settings = &common.settings;
        let horizontal = direction.is_horizontal();
        let pitch_along = pitch(if horizontal {
            settings.raster_step_x
        } else {
            settings.raster_step_y
        });
        let pitch_across = pitch(settings.line_step(horizontal));
        let (along_len, across_len) = if horizontal {
            (image.width(), image.height())
        } else {
            (image.height(), image.width())
        };
        let dark = |along: usize, across: usize| {
            if horizontal {
                image.is_dark(along, across)
            } else {
                image.is_dark(across, along)
            }
        };

        let order: BoxedIterator<usize> = if direction.advances_forward() {
            Box::new(0..across_len)
        } else {
            Box::new((0..across_len).rev())
        };
        let mut lines = Vec::new();
        for index in order {
            let first = (0..along_len).find(|&i| dark(i, index));
            let last = (0..along_len).rev().find(|&i| dark(i, index));
            if let (Some(first), Some(last)) = (first, last) {
                lines.push(ScanLine {
                    index,
                    first,
                    last,
                    forward: settings.raster_swing || lines.len() % 2 == 0,
                });
            }
        }

        Some(Self {
            image: Arc::clone(image),
            origin: *origin,
            horizontal,
            pitch_along,
            pitch_across,
            overscan: settings.overscan.max(0),
            lines,
            line: 0,
            buffer: VecDeque::new(),
        })
    }

    /// Entry point of the first scan line
    pub fn start(&self) -> NativePosition {
        match self.lines.first() {
            Some(line) => self.point(self.entry(line), line.index),
            None => self.origin,
        }
    }

    /// Exit point of the last scan line, overscan included
    pub fn end(&self) -> NativePosition {
        match self.lines.last() {
            Some(line) => self.point(self.exit(line), line.index),
            None => self.origin,
        }
    }

    /// Number of non-blank scan lines
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn along(&self, i: usize) -> i64 {
        let base = if self.horizontal {
            self.origin.x
        } else {
            self.origin.y
        };
        base + (i as f64 * self.pitch_along).round() as i64
    }

    fn across(&self, j: usize) -> i64 {
        let base = if self.horizontal {
            self.origin.y
        } else {
            self.origin.x
        };
        base + (j as f64 * self.pitch_across).round() as i64
    }

    fn point(&self, along: i64, index: usize) -> NativePosition {
        let across = self.across(index);
        if self.horizontal {
            NativePosition::new(along, across)
        } else {
            NativePosition::new(across, along)
        }
    }

    fn entry(&self, line: &ScanLine) -> i64 {
        if line.forward {
            self.along(line.first)
        } else {
            self.along(line.last + 1)
        }
    }

    fn exit(&self, line: &ScanLine) -> i64 {
        if line.forward {
            self.along(line.last + 1) + self.overscan
        } else {
            self.along(line.first) - self.overscan
        }
    }

    fn dark(&self, along: usize, index: usize) -> bool {
        if self.horizontal {
            self.image.is_dark(along, index)
        } else {
            self.image.is_dark(index, along)
        }
    }

    fn fill_line(&mut self, line: ScanLine) {
        if self.line > 0 {
            let position = self.point(self.entry(&line), line.index);
            self.buffer.push_back(Step {
                position,
                on: false,
            });
        }

        let pixels: BoxedIterator<usize> = if line.forward {
            Box::new(line.first..=line.last)
        } else {
            Box::new((line.first..=line.last).rev())
        };
        let mut run: Option<(usize, bool)> = None;
        for i in pixels {
            let on = self.dark(i, line.index);
            match run {
                Some((end, state)) if state != on => {
                    self.push_run_end(&line, end, state);
                    run = Some((i, on));
                }
                _ => run = Some((i, on)),
            }
        }
        if let Some((end, state)) = run {
            self.push_run_end(&line, end, state);
        }

        if self.overscan > 0 {
            let position = self.point(self.exit(&line), line.index);
            self.buffer.push_back(Step {
                position,
                on: false,
            });
        }
    }

    /// Queue the move to the far edge of pixel `end`
    fn push_run_end(&mut self, line: &ScanLine, end: usize, on: bool) {
        let along = if line.forward {
            self.along(end + 1)
        } else {
            self.along(end)
        };
        let position = self.point(along, line.index);
        self.buffer.push_back(Step { position, on });
    }
}

impl Iterator for RasterWalk {
    type Item = Step;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(step) = self.buffer.pop_front() {
                return Some(step);
            }
            let line = *self.lines.get(self.line)?;
            self.fill_line(line);
            self.line += 1;
        }
    }
}

fn pitch(step: f64) -> f64 {
    if step.is_finite() && step > 0.0 {
        step
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutcode::RasterDirection;
    use lhykit_core::LaserSettings;

    fn raster(
        width: usize,
        height: usize,
        pixels: Vec<u8>,
        direction: RasterDirection,
        settings: LaserSettings,
    ) -> CutPrimitive {
        CutPrimitive::raster(
            NativePosition::new(100, 200),
            RasterImage::new(width, height, pixels).unwrap(),
            direction,
            Arc::new(settings),
        )
    }

    fn stepped(x: f64, y: f64) -> LaserSettings {
        LaserSettings {
            raster_step_x: x,
            raster_step_y: y,
            ..LaserSettings::default()
        }
    }

    #[test]
    fn test_horizontal_runs_alternate() {
        #[rustfmt::skip]
        let pixels = vec![
            255, 0, 0, 255,
            255, 255, 255, 255,
            0, 255, 0, 255,
        ];
        let cut = raster(4, 3, pixels, RasterDirection::TopToBottom, stepped(1.0, 2.0));
        let walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.line_count(), 2);
        assert_eq!(walk.start(), NativePosition::new(101, 200));

        let steps: Vec<_> = walk.collect();
        let expected = vec![
            // Row 0, rightwards over pixels 1..=2.
            (103, 200, true),
            // Row 1 is blank, row 2 is entered from its right edge.
            (103, 204, false),
            (102, 204, true),
            (101, 204, false),
            (100, 204, true),
        ];
        let actual: Vec<_> = steps
            .iter()
            .map(|s| (s.position.x, s.position.y, s.on))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_overscan_and_end() {
        let settings = LaserSettings {
            overscan: 5,
            ..stepped(2.0, 1.0)
        };
        let cut = raster(2, 2, vec![0, 0, 0, 0], RasterDirection::TopToBottom, settings);
        let walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.end(), NativePosition::new(95, 201));

        let steps: Vec<_> = walk.collect();
        assert_eq!(steps[0].position, NativePosition::new(104, 200));
        assert_eq!(steps[1], Step {
            position: NativePosition::new(109, 200),
            on: false
        });
        assert_eq!(steps.last().map(|s| s.position), Some(NativePosition::new(95, 201)));
    }

    #[test]
    fn test_bottom_to_top_starts_on_last_row() {
        let cut = raster(1, 3, vec![0, 0, 0], RasterDirection::BottomToTop, stepped(1.0, 3.0));
        let walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.start(), NativePosition::new(100, 206));
        assert_eq!(walk.end(), NativePosition::new(101, 200));
    }

    #[test]
    fn test_vertical_columns() {
        #[rustfmt::skip]
        let pixels = vec![
            0, 255,
            0, 0,
        ];
        let cut = raster(2, 2, pixels, RasterDirection::LeftToRight, stepped(3.0, 1.0));
        let walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.start(), NativePosition::new(100, 200));

        let actual: Vec<_> = walk.map(|s| (s.position.x, s.position.y, s.on)).collect();
        assert_eq!(
            actual,
            vec![(100, 202, true), (103, 202, false), (103, 201, true)]
        );
    }

    #[test]
    fn test_swing_runs_every_line_forward() {
        let settings = LaserSettings {
            raster_swing: true,
            ..stepped(1.0, 2.0)
        };
        let cut = raster(2, 2, vec![0, 0, 0, 0], RasterDirection::TopToBottom, settings);
        let walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.end(), NativePosition::new(102, 202));

        let actual: Vec<_> = walk.map(|s| (s.position.x, s.position.y, s.on)).collect();
        assert_eq!(
            actual,
            vec![(102, 200, true), (100, 202, false), (102, 202, true)]
        );
    }

    #[test]
    fn test_line_pitch_from_other_axis() {
        // Only the along-axis step is set; lines still advance by it.
        let cut = raster(2, 1, vec![0, 0], RasterDirection::LeftToRight, stepped(0.0, 2.0));
        let walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.line_count(), 2);
        assert_eq!(walk.end(), NativePosition::new(102, 200));
    }

    #[test]
    fn test_blank_image() {
        let cut = raster(2, 2, vec![255; 4], RasterDirection::TopToBottom, stepped(1.0, 1.0));
        let mut walk = RasterWalk::from_cut(&cut).unwrap();
        assert_eq!(walk.start(), NativePosition::new(100, 200));
        assert!(walk.next().is_none());
    }
}
