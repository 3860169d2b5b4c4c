//! Plot planner
//!
//! Turns queued cut primitives into a flat stream of [`PlannerEvent`]s. Each
//! event is either a geometry move to an absolute position, with bit 0
//! carrying the laser state, or a control event announcing settings, axis,
//! direction, a reposition or the end of the batch.
//!
//! The planner is pull based: [`PlotPlanner::next_event`] produces one event
//! at a time and [`PlotPlanner::generate`] wraps it in an iterator that ends
//! after the single `PLOT_FINISH` of the batch.

use crate::cutcode::{CutPrimitive, MajorAxis};
use crate::plotter::{PolylineWalk, Step};
use crate::raster::RasterWalk;
use lhykit_core::{LaserSettings, NativePosition};
use std::collections::VecDeque;
use std::sync::Arc;

/// Laser on during the move
pub const PLOT_ON: u32 = 1;
/// Short reposition that may be jogged
pub const PLOT_JOG: u32 = 2;
/// Reposition with the laser off
pub const PLOT_RAPID: u32 = 4;
/// Initial travel direction of the following geometry
pub const PLOT_DIRECTION: u32 = 32;
/// Major axis of the following geometry
pub const PLOT_AXIS: u32 = 64;
/// New settings apply to the following geometry
pub const PLOT_SETTING: u32 = 128;
/// End of the batch
pub const PLOT_FINISH: u32 = 256;

/// Accumulated pulse power needed to fire one step
const PPI_THRESHOLD: f64 = 1000.0;

/// One planner event
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerEvent {
    /// Target x, or the event payload for control events
    pub x: i64,
    /// Target y, or the event payload for control events
    pub y: i64,
    /// Flag bits
    pub flag: u32,
    /// Settings carried by `PLOT_SETTING` events
    pub settings: Option<Arc<LaserSettings>>,
}

impl PlannerEvent {
    /// Event without settings
    pub fn new(x: i64, y: i64, flag: u32) -> Self {
        Self {
            x,
            y,
            flag,
            settings: None,
        }
    }

    fn geometry(position: NativePosition, on: bool) -> Self {
        Self::new(position.x, position.y, if on { PLOT_ON } else { 0 })
    }

    /// Whether this is a control event rather than a move
    pub fn is_control(&self) -> bool {
        self.flag > PLOT_ON
    }

    /// Whether the laser fires during this move
    pub fn is_on(&self) -> bool {
        self.flag & PLOT_ON != 0
    }

    /// Whether this event ends the batch
    pub fn is_finish(&self) -> bool {
        self.flag & PLOT_FINISH != 0
    }

    /// Target position of a move
    pub fn position(&self) -> NativePosition {
        NativePosition::new(self.x, self.y)
    }
}

/// Software pulse modulation
///
/// Every laser-on step adds the power to the accumulator and the step only
/// fires once a full threshold has built up.
#[derive(Debug, Clone, Default)]
struct PulseAccumulator {
    total: f64,
}

impl PulseAccumulator {
    fn fire(&mut self, power: f64) -> bool {
        self.total += power.clamp(0.0, PPI_THRESHOLD);
        if self.total >= PPI_THRESHOLD {
            self.total -= PPI_THRESHOLD;
            true
        } else {
            false
        }
    }
}

/// Collapses unit steps travelling the same way into one move
#[derive(Debug, Clone, Default)]
struct StepGrouper {
    last: Option<NativePosition>,
    pending: Option<(NativePosition, (i64, i64), bool)>,
}

impl StepGrouper {
    fn push(&mut self, position: NativePosition, on: bool, out: &mut VecDeque<PlannerEvent>) {
        let direction = self.last.map_or((0, 0), |last| heading(last, position));
        self.last = Some(position);
        match self.pending.as_mut() {
            Some((pending, dir, state)) if *dir == direction && *state == on => *pending = position,
            _ => {
                self.flush(out);
                self.pending = Some((position, direction, on));
            }
        }
    }

    fn flush(&mut self, out: &mut VecDeque<PlannerEvent>) {
        if let Some((position, _, on)) = self.pending.take() {
            out.push_back(PlannerEvent::geometry(position, on));
        }
    }

    fn reset(&mut self, position: Option<NativePosition>) {
        self.last = position;
        self.pending = None;
    }
}

/// Constant-move smoothing
///
/// Holds back the latest point until a later point moves the constrained
/// axes, so consecutive emitted moves never repeat a constrained coordinate.
/// Points continuing the current heading are merged.
/// A held point that never becomes valid is still emitted on flush so the
/// head ends where the geometry ends.
#[derive(Debug, Clone, Default)]
struct Smoother {
    constrain_x: bool,
    constrain_y: bool,
    last: Option<NativePosition>,
    pending: Option<(NativePosition, bool)>,
}

impl Smoother {
    fn is_active(&self) -> bool {
        self.constrain_x || self.constrain_y
    }

    fn configure(&mut self, settings: &LaserSettings) {
        self.constrain_x = settings.constant_move_x;
        self.constrain_y = settings.constant_move_y;
    }

    fn differs(&self, a: NativePosition, b: Option<NativePosition>) -> bool {
        let Some(b) = b else {
            return true;
        };
        (!self.constrain_x || a.x != b.x) && (!self.constrain_y || a.y != b.y)
    }

    fn push(&mut self, position: NativePosition, on: bool, out: &mut VecDeque<PlannerEvent>) {
        if let Some((pending, pending_on)) = self.pending {
            let valid = self.differs(pending, self.last);
            let straight = pending_on == on
                && self.last.map(|last| heading(last, pending)) == Some(heading(pending, position));
            if valid && !straight && (self.differs(position, Some(pending)) || pending_on != on) {
                out.push_back(PlannerEvent::geometry(pending, pending_on));
                self.last = Some(pending);
            }
        }
        self.pending = Some((position, on));
    }

    fn flush(&mut self, out: &mut VecDeque<PlannerEvent>) {
        if let Some((pending, on)) = self.pending.take() {
            out.push_back(PlannerEvent::geometry(pending, on));
            self.last = Some(pending);
        }
    }

    fn reset(&mut self, position: Option<NativePosition>) {
        self.last = position;
        self.pending = None;
    }
}

fn heading(from: NativePosition, to: NativePosition) -> (i64, i64) {
    ((to.x - from.x).signum(), (to.y - from.y).signum())
}

#[derive(Debug)]
enum CutStream {
    Vector {
        walk: PolylineWalk,
        power: f64,
    },
    Raster(RasterWalk),
}

/// Plot planner
#[derive(Debug, Default)]
pub struct PlotPlanner {
    queue: VecDeque<CutPrimitive>,
    out: VecDeque<PlannerEvent>,
    stream: Option<CutStream>,
    settings: Option<Arc<LaserSettings>>,
    axis: Option<MajorAxis>,
    direction: Option<(i64, i64)>,
    position: Option<NativePosition>,
    pulses: PulseAccumulator,
    grouper: StepGrouper,
    smoother: Smoother,
}

impl PlotPlanner {
    /// Create an empty planner
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a primitive
    pub fn push(&mut self, cut: CutPrimitive) {
        self.queue.push_back(cut);
    }

    /// Queue several primitives
    pub fn extend(&mut self, cuts: impl IntoIterator<Item = CutPrimitive>) {
        self.queue.extend(cuts);
    }

    /// Number of queued primitives not yet started
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued or in flight
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.out.is_empty() && self.stream.is_none()
    }

    /// Settings of the last `PLOT_SETTING` event
    pub fn settings(&self) -> Option<&Arc<LaserSettings>> {
        self.settings.as_ref()
    }

    /// Tell the planner where the head currently is
    ///
    /// Called by the consumer between batches so repositions are planned
    /// from the real head position.
    pub fn set_position(&mut self, position: NativePosition) {
        self.position = Some(position);
        self.grouper.reset(Some(position));
        self.smoother.reset(Some(position));
    }

    /// Drop queued and in-flight work, keeping what was already declared
    pub fn clear(&mut self) {
        self.queue.clear();
        self.out.clear();
        self.stream = None;
        self.pulses = PulseAccumulator::default();
        self.grouper.reset(self.position);
        self.smoother.reset(self.position);
    }

    /// Drop everything, including declared settings, axis, direction and position
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Lazy event sequence for the queued primitives
    ///
    /// Ends after the batch's `PLOT_FINISH`. Consumed events are gone; the
    /// planner can be reused for the next batch.
    pub fn generate(&mut self) -> Plan<'_> {
        Plan {
            planner: self,
            done: false,
        }
    }

    /// Produce the next event, `PLOT_FINISH` once the queue is drained
    pub fn next_event(&mut self) -> PlannerEvent {
        loop {
            if let Some(event) = self.out.pop_front() {
                return event;
            }
            if self.stream.is_some() {
                self.advance_stream();
                continue;
            }
            match self.queue.pop_front() {
                Some(cut) => self.begin_cut(cut),
                None => {
                    self.flush_geometry();
                    if self.out.is_empty() {
                        return PlannerEvent::new(0, 0, PLOT_FINISH);
                    }
                }
            }
        }
    }

    fn advance_stream(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        match stream {
            CutStream::Vector { walk, power } => match walk.next() {
                Some(Step { position, on }) => {
                    let on = on && self.pulses.fire(*power);
                    self.position = Some(position);
                    if self.smoother.is_active() {
                        self.smoother.push(position, on, &mut self.out);
                    } else {
                        self.grouper.push(position, on, &mut self.out);
                    }
                }
                None => {
                    self.stream = None;
                    if !self.smoother.is_active() {
                        self.grouper.flush(&mut self.out);
                    }
                }
            },
            CutStream::Raster(walk) => match walk.next() {
                Some(Step { position, on }) => {
                    self.position = Some(position);
                    self.out.push_back(PlannerEvent::geometry(position, on));
                }
                None => {
                    self.stream = None;
                    self.grouper.reset(self.position);
                    self.smoother.reset(self.position);
                }
            },
        }
    }

    fn flush_geometry(&mut self) {
        self.grouper.flush(&mut self.out);
        self.smoother.flush(&mut self.out);
    }

    fn begin_cut(&mut self, cut: CutPrimitive) {
        let Some(common) = cut.common().cloned() else {
            self.begin_action(&cut);
            return;
        };

        if common.passes > 1 {
            self.queue.push_front(cut.with_passes(common.passes - 1));
        }
        if let CutPrimitive::Raster {
            origin,
            image,
            direction,
            crosshatch: true,
            ..
        } = &cut
        {
            self.queue.push_front(CutPrimitive::Raster {
                origin: *origin,
                image: Arc::clone(image),
                direction: direction.crossed(),
                crosshatch: false,
                common: common.clone().with_passes(1),
            });
        }

        let raster = RasterWalk::from_cut(&cut);
        let settings = common.settings;
        let settings_changed = self.settings.as_deref() != Some(&*settings);
        let start = match &raster {
            Some(walk) => Some(walk.start()),
            None => cut.start(),
        };
        let needs_move = start.is_some() && start != self.position;

        if settings_changed || needs_move || raster.is_some() {
            self.flush_geometry();
        }

        if settings_changed {
            let mut event = PlannerEvent::new(0, 0, PLOT_SETTING);
            event.settings = Some(Arc::clone(&settings));
            self.out.push_back(event);
            self.settings = Some(Arc::clone(&settings));
            self.smoother.configure(&settings);
            self.axis = None;
            self.direction = None;
        }

        let axis = cut.major_axis();
        if self.axis != Some(axis) {
            self.out
                .push_back(PlannerEvent::new(axis.code(), 0, PLOT_AXIS));
            self.axis = Some(axis);
        }

        let direction = (cut.x_dir(), cut.y_dir());
        if self.direction != Some(direction) {
            self.out
                .push_back(PlannerEvent::new(direction.0, direction.1, PLOT_DIRECTION));
            self.direction = Some(direction);
        }

        if let Some(start) = start.filter(|_| needs_move) {
            let flag = if self.can_jog(&settings, settings_changed, start) {
                PLOT_JOG
            } else {
                PLOT_RAPID
            };
            self.reposition(start, flag);
        }

        self.stream = match raster {
            Some(walk) => Some(CutStream::Raster(walk)),
            None => PolylineWalk::from_cut(&cut).map(|walk| CutStream::Vector {
                walk,
                power: settings.power,
            }),
        };
    }

    fn begin_action(&mut self, cut: &CutPrimitive) {
        match cut {
            CutPrimitive::Goto { start } | CutPrimitive::Dwell { start, .. } => {
                self.flush_geometry();
                self.reposition(*start, PLOT_RAPID);
            }
            CutPrimitive::Home => {
                self.flush_geometry();
                self.reposition(NativePosition::default(), PLOT_RAPID);
            }
            other => {
                tracing::debug!("Planner skipping device action {:?}", other);
            }
        }
    }

    fn can_jog(&self, settings: &LaserSettings, settings_changed: bool, target: NativePosition) -> bool {
        if !settings.jog_enable || settings_changed {
            return false;
        }
        let Some(position) = self.position else {
            return false;
        };
        let distance = (target.x - position.x)
            .abs()
            .max((target.y - position.y).abs());
        distance <= settings.jog_distance
    }

    fn reposition(&mut self, target: NativePosition, flag: u32) {
        self.out
            .push_back(PlannerEvent::new(target.x, target.y, flag));
        self.position = Some(target);
        self.grouper.reset(Some(target));
        self.smoother.reset(Some(target));
    }
}

/// Event sequence of one batch, see [`PlotPlanner::generate`]
pub struct Plan<'a> {
    planner: &'a mut PlotPlanner,
    done: bool,
}

impl Iterator for Plan<'_> {
    type Item = PlannerEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let event = self.planner.next_event();
        if event.is_finish() {
            self.done = true;
        }
        Some(event)
    }
}
