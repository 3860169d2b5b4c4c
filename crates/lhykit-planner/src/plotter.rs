//! Scan conversion of vector geometry into unit steps

use crate::cutcode::{CutPrimitive, PlotPoint};
use lhykit_core::NativePosition;

/// Control polygon length, in device units, covered by one curve sample
const CURVE_SAMPLE_SPACING: f64 = 4.0;
const MAX_CURVE_SAMPLES: usize = 4096;

/// Bresenham walk from `start` to `end`
///
/// Yields every grid point after `start` up to and including `end`, each
/// at most one unit away from the previous on either axis.
#[derive(Debug, Clone)]
pub struct LineWalk {
    x: i64,
    y: i64,
    x1: i64,
    y1: i64,
    dx: i64,
    dy: i64,
    sx: i64,
    sy: i64,
    err: i64,
}

impl LineWalk {
    /// Create a walk between two points
    pub fn new(start: NativePosition, end: NativePosition) -> Self {
        let dx = (end.x - start.x).abs();
        let dy = -(end.y - start.y).abs();
        Self {
            x: start.x,
            y: start.y,
            x1: end.x,
            y1: end.y,
            dx,
            dy,
            sx: if start.x < end.x { 1 } else { -1 },
            sy: if start.y < end.y { 1 } else { -1 },
            err: dx + dy,
        }
    }
}

impl Iterator for LineWalk {
    type Item = NativePosition;

    fn next(&mut self) -> Option<Self::Item> {
        if self.x == self.x1 && self.y == self.y1 {
            return None;
        }
        let e2 = 2 * self.err;
        if e2 >= self.dy {
            self.err += self.dy;
            self.x += self.sx;
        }
        if e2 <= self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }
        Some(NativePosition::new(self.x, self.y))
    }
}

/// Move target with the laser state requested while travelling to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Position after the move
    pub position: NativePosition,
    /// Requested laser state during the move
    pub on: bool,
}

/// Unit-step walk along a polyline
#[derive(Debug, Clone)]
pub struct PolylineWalk {
    vertices: Vec<PlotPoint>,
    index: usize,
    segment: Option<LineWalk>,
}

impl PolylineWalk {
    /// Walk through explicit vertices, the first one is the start
    pub fn new(vertices: Vec<PlotPoint>) -> Self {
        Self {
            vertices,
            index: 0,
            segment: None,
        }
    }

    /// Build the walk for a vector primitive
    pub fn from_cut(cut: &CutPrimitive) -> Option<Self> {
        let vertices = match cut {
            CutPrimitive::Line { start, end, .. } => vec![on_point(*start), on_point(*end)],
            CutPrimitive::Quad {
                start, control, end, ..
            } => sample_curve(&[*start, *control, *end]),
            CutPrimitive::Cubic {
                start,
                control1,
                control2,
                end,
                ..
            } => sample_curve(&[*start, *control1, *control2, *end]),
            CutPrimitive::Plot { points, .. } => points.clone(),
            _ => return None,
        };
        Some(Self::new(vertices))
    }
}

impl Iterator for PolylineWalk {
    type Item = Step;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(segment) = self.segment.as_mut() {
                if let Some(position) = segment.next() {
                    let on = self.vertices[self.index].on;
                    return Some(Step { position, on });
                }
                self.segment = None;
            }
            let from = self.vertices.get(self.index)?.position;
            let to = self.vertices.get(self.index + 1)?.position;
            self.index += 1;
            self.segment = Some(LineWalk::new(from, to));
        }
    }
}

fn on_point(position: NativePosition) -> PlotPoint {
    PlotPoint { position, on: true }
}

/// Sample a Bézier curve given by its control points into integer vertices
pub fn sample_curve(control: &[NativePosition]) -> Vec<PlotPoint> {
    let Some(first) = control.first() else {
        return Vec::new();
    };
    let polygon: f64 = control
        .windows(2)
        .map(|pair| {
            let dx = (pair[1].x - pair[0].x) as f64;
            let dy = (pair[1].y - pair[0].y) as f64;
            dx.hypot(dy)
        })
        .sum();
    let samples = ((polygon / CURVE_SAMPLE_SPACING).ceil() as usize).clamp(1, MAX_CURVE_SAMPLES);

    let mut vertices = vec![on_point(*first)];
    for i in 1..=samples {
        let t = i as f64 / samples as f64;
        let (x, y) = de_casteljau(control, t);
        let position = NativePosition::new(x.round() as i64, y.round() as i64);
        if vertices.last().map(|v| v.position) != Some(position) {
            vertices.push(on_point(position));
        }
    }
    vertices
}

fn de_casteljau(control: &[NativePosition], t: f64) -> (f64, f64) {
    let mut points: Vec<(f64, f64)> = control.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    while points.len() > 1 {
        for i in 0..points.len() - 1 {
            let (x0, y0) = points[i];
            let (x1, y1) = points[i + 1];
            points[i] = (x0 + (x1 - x0) * t, y0 + (y1 - y0) * t);
        }
        points.pop();
    }
    points.first().copied().unwrap_or_default()
}
