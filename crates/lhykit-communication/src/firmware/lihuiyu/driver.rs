//! Lihuiyu driver state machine
//!
//! Consumes plot planner events and writes the LHYMICRO-GL byte protocol.
//! The driver tracks the board's mode, the head position in native units and
//! the direction the board last had declared, so that every byte it writes
//! makes sense to the firmware in its current state.
//!
//! Modes:
//! - Rapid: idle. Every move is a self contained `I...S1P` command.
//! - Finish: between programs. Moves are terminated with `N`.
//! - Program: vector cutting inside a declared program.
//! - Raster: stepped engraving inside a declared program.
//! - ModeChange: settings changed inside a program; resolved on the next move.
//!
//! Bytes are staged per operation and written to the sink under one lock,
//! so realtime commands from other threads never split a fragment.

use super::clock::{Clock, SystemClock};
use super::direction::{Properties, StagedDirection, CODE_BOTTOM, CODE_LEFT, CODE_RIGHT, CODE_TOP};
use super::distance::write_distance;
use super::holds::{Hold, HoldController};
use super::realtime::{RealtimeHandle, RESET};
use super::space::DeviceSpace;
use super::speedcode::{SpeedCodeProvider, SpeedCodeRequest};
use super::step::StepAccumulator;
use crate::communication::SharedSink;
use lhykit_core::{
    DriverEvent, DriverMode, Error, EventDispatcher, LaserSettings, NativePosition, ProtocolError,
    Result,
};
use lhykit_planner::{
    CutPrimitive, LineWalk, PlannerEvent, PlotPlanner, PLOT_AXIS, PLOT_DIRECTION, PLOT_FINISH,
    PLOT_JOG, PLOT_RAPID, PLOT_SETTING,
};
use lhykit_settings::{DeviceConfig, JogMode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CODE_ANGLE: &[u8] = b"M";
const CODE_LASER_ON: &[u8] = b"D";
const CODE_LASER_OFF: &[u8] = b"U";

const MAX_POWER: f64 = 1000.0;

/// Pre-encoded data the driver can forward untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    /// Raw LHYMICRO-GL bytes
    Egv,
}

impl FromStr for BlobType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "egv" => Ok(BlobType::Egv),
            _ => Err(ProtocolError::UnsupportedBlob {
                blob_type: s.to_string(),
            }),
        }
    }
}

/// Driver parameter updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverSetting {
    /// Pulse density, clamped to 0..=1000
    Power(f64),
    /// Speed in mm/s
    Speed(f64),
    /// Overscan in native units
    Overscan(i64),
    /// Acceleration override
    Acceleration(Option<u8>),
    /// Diagonal ratio override
    DRatio(Option<f64>),
    /// Raster step per axis
    RasterStep { x: f64, y: f64 },
    /// Interpret jog targets as relative
    Relative(bool),
}

/// Lihuiyu board driver
pub struct LihuiyuDriver {
    config: DeviceConfig,
    space: DeviceSpace,
    sink: SharedSink,
    speed_codes: Box<dyn SpeedCodeProvider>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    cancel: Arc<AtomicBool>,
    realtime: RealtimeHandle,
    planner: PlotPlanner,
    holds: HoldController,

    /// Working copy of the active settings
    settings: LaserSettings,
    state: DriverMode,
    native: NativePosition,
    origin: NativePosition,
    properties: Properties,
    staged: StagedDirection,
    laser: bool,
    is_relative: bool,

    /// Step of the current raster program
    step: f64,
    /// Step the firmware applies by itself on a line switch
    step_value_set: i64,
    /// Line switches since program entry
    step_index: u64,
    step_total: StepAccumulator,

    pending: Vec<u8>,
}

impl LihuiyuDriver {
    /// Create a driver writing to `sink`
    pub fn new(
        config: DeviceConfig,
        sink: SharedSink,
        speed_codes: impl SpeedCodeProvider + 'static,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let realtime = RealtimeHandle::new(Arc::clone(&sink), Arc::clone(&cancel));
        let holds = HoldController::new(vec![Hold::BufferOverLimit {
            enabled: config.buffer_limit,
            max: config.buffer_max,
        }]);
        Self {
            space: DeviceSpace::from_config(&config),
            config,
            sink,
            speed_codes: Box::new(speed_codes),
            clock: Arc::new(SystemClock),
            events: EventDispatcher::default(),
            cancel,
            realtime,
            planner: PlotPlanner::new(),
            holds,
            settings: LaserSettings::default(),
            state: DriverMode::Rapid,
            native: NativePosition::default(),
            origin: NativePosition::default(),
            properties: Properties::default(),
            staged: StagedDirection::default(),
            laser: false,
            is_relative: false,
            step: 0.0,
            step_value_set: 0,
            step_index: 0,
            step_total: StepAccumulator::new(),
            pending: Vec::new(),
        }
    }

    /// Builder-style clock used for holds, waits and dwells
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder-style signal sink
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Builder-style initial settings
    pub fn with_settings(mut self, settings: LaserSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> DriverMode {
        self.state
    }

    /// Head position in native units
    pub fn native_position(&self) -> NativePosition {
        self.native
    }

    pub fn origin(&self) -> NativePosition {
        self.origin
    }

    /// Whether the laser is firing
    pub fn laser(&self) -> bool {
        self.laser
    }

    pub fn settings(&self) -> &LaserSettings {
        &self.settings
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    pub fn is_relative(&self) -> bool {
        self.is_relative
    }

    /// Step of the current raster program
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Step the firmware applies on its own at each line switch
    pub fn step_value_set(&self) -> i64 {
        self.step_value_set
    }

    /// Line switches since the last program entry
    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn planner(&self) -> &PlotPlanner {
        &self.planner
    }

    /// Handle for pause, resume, reset and abort from other threads
    pub fn realtime(&self) -> RealtimeHandle {
        self.realtime.clone()
    }

    /// Whether a reset was requested and not yet handled
    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    // ---------------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------------

    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn push_distance(&mut self, value: i64) {
        write_distance(&mut self.pending, value.unsigned_abs());
    }

    /// Write staged bytes as one fragment
    fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let (result, level) = {
            let mut sink = self.sink.lock();
            let result = sink.write(&self.pending);
            (result, sink.len())
        };
        self.pending.clear();
        if let Err(e) = result {
            tracing::error!("Output sink write failed: {}", e);
            return Err(e.into());
        }
        self.events.publish(DriverEvent::BufferLevel(level));
        Ok(())
    }

    fn signal_mode(&self) {
        tracing::debug!("Driver mode {}", self.state);
        self.events.publish(DriverEvent::ModeChanged(self.state));
    }

    fn signal_position(&self, old: NativePosition) {
        if old != self.native {
            self.events.publish(DriverEvent::PositionChanged {
                old,
                new: self.native,
            });
        }
    }

    // ---------------------------------------------------------------------
    // Holds
    // ---------------------------------------------------------------------

    /// Whether work of the given priority must wait
    ///
    /// Realtime work (priority above zero) never waits. A shut down sink is
    /// a fatal connection error.
    pub fn hold_work(&mut self, priority: u8) -> Result<bool> {
        let sink = self.sink.lock();
        Ok(self.holds.hold_work(priority, &**sink)?)
    }

    /// Block until no hold applies to background work
    pub fn wait_for_holds(&mut self) -> Result<()> {
        let interval = Duration::from_millis(self.config.hold_poll_interval_ms);
        let mut announced = false;
        loop {
            if self.cancel_requested() {
                return Err(Error::Cancelled);
            }
            if !self.hold_work(0)? {
                return Ok(());
            }
            if !announced {
                tracing::debug!("Holding background work");
                announced = true;
            }
            self.clock.sleep(interval);
        }
    }

    /// Hold further work until the sink has drained
    pub fn wait_finish(&mut self) {
        self.holds.add_temporary(Hold::BufferNotEmpty);
    }

    /// Stall the job
    pub fn wait(&mut self, time_ms: u64) {
        self.clock.sleep(Duration::from_millis(time_ms));
    }

    // ---------------------------------------------------------------------
    // Modes
    // ---------------------------------------------------------------------

    /// Enter rapid mode
    pub fn rapid_mode(&mut self) -> Result<()> {
        self.enter_rapid();
        self.commit()
    }

    /// Enter finished mode
    pub fn finished_mode(&mut self) -> Result<()> {
        self.enter_finished();
        self.commit()
    }

    /// Enter raster mode with the current settings
    pub fn raster_mode(&mut self) -> Result<()> {
        self.enter_raster();
        self.commit()
    }

    /// Enter program mode with the current settings
    pub fn program_mode(&mut self) -> Result<()> {
        self.enter_program(0, 0);
        self.commit()
    }

    fn enter_rapid(&mut self) {
        match self.state {
            DriverMode::Rapid => return,
            DriverMode::Finish => {
                self.push(b"S1P\n");
                if !self.config.autolock {
                    self.push(b"IS2P\n");
                }
            }
            DriverMode::Program | DriverMode::Raster | DriverMode::ModeChange => {
                self.push(b"FNSE-\n");
                self.laser = false;
            }
        }
        self.state = DriverMode::Rapid;
        self.signal_mode();
    }

    fn enter_finished(&mut self) {
        match self.state {
            DriverMode::Finish => return,
            DriverMode::Program | DriverMode::Raster | DriverMode::ModeChange => {
                self.push(b"@NSE");
                self.laser = false;
            }
            DriverMode::Rapid => self.push(b"I"),
        }
        self.state = DriverMode::Finish;
        self.signal_mode();
    }

    fn enter_raster(&mut self) {
        if self.state == DriverMode::Raster {
            return;
        }
        self.enter_finished();
        self.enter_program(0, 0);
    }

    /// Declare a program, moving by `(dx, dy)` between the speed code and
    /// the direction declaration
    fn enter_program(&mut self, dx: i64, dy: i64) {
        if self.state == DriverMode::Program {
            return;
        }
        self.enter_finished();

        self.step_index = 0;
        self.step_value_set = 0;
        self.staged.apply_to(&mut self.properties);
        if self.config.strict {
            self.properties.unset(
                Properties::LEFTWARD | Properties::TOPWARD | Properties::HORIZONTAL_MAJOR,
            );
        }

        self.step = self.settings.line_step(self.properties.horizontal_major());
        let firmware_steps = !(self.settings.raster_alt
            || self.settings.raster_swing
            || (self.config.nse_raster && !self.config.nse_stepraster));
        if firmware_steps {
            self.step_value_set = self.step.round_ties_even() as i64;
        }

        let request = SpeedCodeRequest {
            board: self.config.board.clone(),
            speed: self.settings.speed,
            step: self.step_value_set,
            d_ratio: self.settings.d_ratio,
            acceleration: self.settings.acceleration,
            suffix_c: (!self.config.twitches || self.settings.force_twitchless)
                && self.step == 0.0,
            fix_speeds: self.config.fix_speeds,
            raster_horizontal: self.properties.horizontal_major(),
        };
        let code = self.speed_codes.speed_code(&request);
        self.push(&code);
        self.goto_xy(dx, dy);
        self.push(b"N");
        let directions = self.properties.declare();
        self.push(&directions);
        self.push(b"S1E");

        self.state = if self.settings.is_raster() {
            DriverMode::Raster
        } else {
            DriverMode::Program
        };
        self.signal_mode();
    }

    /// Leave the program with `@NSE` and re-enter it, moving on the way
    fn mode_shift_on_the_fly(&mut self, dx: i64, dy: i64) {
        self.push(b"@NSE");
        self.laser = false;
        self.state = DriverMode::Rapid;
        self.enter_program(dx, dy);
    }

    fn reset_modes(&mut self) {
        self.laser = false;
        self.staged.clear();
        self.properties = Properties::default();
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    fn mark_mode_change(&mut self) {
        if self.state.is_programmed() {
            self.state = DriverMode::ModeChange;
        }
    }

    fn set_speed(&mut self, speed: f64) {
        if self.settings.speed != speed {
            self.settings.speed = speed;
            self.mark_mode_change();
        }
    }

    fn set_d_ratio(&mut self, d_ratio: Option<f64>) {
        if self.settings.d_ratio != d_ratio {
            self.settings.d_ratio = d_ratio;
            self.mark_mode_change();
        }
    }

    fn set_acceleration(&mut self, acceleration: Option<u8>) {
        if self.settings.acceleration != acceleration {
            self.settings.acceleration = acceleration;
            self.mark_mode_change();
        }
    }

    fn set_step(&mut self, x: f64, y: f64) {
        if self.settings.raster_step_x != x || self.settings.raster_step_y != y {
            self.settings.raster_step_x = x;
            self.settings.raster_step_y = y;
            self.mark_mode_change();
        }
    }

    fn set_power(&mut self, power: f64) {
        let power = if power.is_nan() {
            0.0
        } else {
            power.clamp(0.0, MAX_POWER)
        };
        if self.settings.power != power {
            self.settings.power = power;
            self.mark_mode_change();
        }
    }

    /// Apply a settings snapshot from the planner
    fn apply_settings(&mut self, incoming: &LaserSettings) {
        self.set_power(incoming.power);
        if self.settings.requires_mode_change(incoming) {
            self.set_speed(incoming.speed);
            self.set_step(incoming.raster_step_x, incoming.raster_step_y);
            self.set_acceleration(incoming.acceleration);
            self.set_d_ratio(incoming.d_ratio);
        }
        let power = self.settings.power;
        self.settings = LaserSettings {
            power,
            ..incoming.clone()
        };
    }

    /// Update a driver parameter
    pub fn set(&mut self, setting: DriverSetting) {
        match setting {
            DriverSetting::Power(power) => self.set_power(power),
            DriverSetting::Speed(speed) => self.set_speed(speed),
            DriverSetting::Overscan(overscan) => self.settings.overscan = overscan,
            DriverSetting::Acceleration(acceleration) => self.set_acceleration(acceleration),
            DriverSetting::DRatio(d_ratio) => self.set_d_ratio(d_ratio),
            DriverSetting::RasterStep { x, y } => self.set_step(x, y),
            DriverSetting::Relative(relative) => self.is_relative = relative,
        }
    }

    // ---------------------------------------------------------------------
    // Laser
    // ---------------------------------------------------------------------

    /// Turn the laser on in place, `false` if it already was
    pub fn laser_on(&mut self) -> Result<bool> {
        let changed = self.switch_laser(true);
        self.commit()?;
        Ok(changed)
    }

    /// Turn the laser off in place, `false` if it already was
    pub fn laser_off(&mut self) -> Result<bool> {
        let changed = self.switch_laser(false);
        self.commit()?;
        Ok(changed)
    }

    fn switch_laser(&mut self, on: bool) -> bool {
        if self.laser == on {
            return false;
        }
        let code = if on { CODE_LASER_ON } else { CODE_LASER_OFF };
        match self.state {
            DriverMode::Rapid => {
                self.push(b"I");
                self.push(code);
                self.push(b"S1P\n");
                if !self.config.autolock {
                    self.push(b"IS2P\n");
                }
            }
            DriverMode::Program | DriverMode::Raster => self.push(code),
            DriverMode::Finish => {
                self.push(code);
                self.push(b"N");
            }
            DriverMode::ModeChange => {}
        }
        self.laser = on;
        true
    }

    // ---------------------------------------------------------------------
    // Motion
    // ---------------------------------------------------------------------

    /// Orthogonal move, x first
    ///
    /// Outside a program every leg declares its direction; inside one the
    /// byte is only sent when the board is not already travelling that way.
    fn goto_xy(&mut self, dx: i64, dy: i64) {
        let rapid = !self.state.is_programmed();
        if dx != 0 {
            self.native.x += dx;
            if dx > 0 {
                if !self.properties.is_right() || rapid {
                    self.push(CODE_RIGHT);
                    self.properties.unset(Properties::LEFTWARD);
                }
            } else if !self.properties.is_left() || rapid {
                self.push(CODE_LEFT);
                self.properties.set(Properties::LEFTWARD);
            }
            self.properties.engage_x();
            self.push_distance(dx);
        }
        if dy != 0 {
            self.native.y += dy;
            if dy > 0 {
                if !self.properties.is_bottom() || rapid {
                    self.push(CODE_BOTTOM);
                    self.properties.unset(Properties::TOPWARD);
                }
            } else if !self.properties.is_top() || rapid {
                self.push(CODE_TOP);
                self.properties.set(Properties::TOPWARD);
            }
            self.properties.engage_y();
            self.push_distance(dy);
        }
    }

    /// Program move with the laser in the requested state
    ///
    /// Equal deltas go out as a single diagonal.
    fn goto_octent(&mut self, dx: i64, dy: i64, on: bool) {
        if dx == 0 && dy == 0 {
            return;
        }
        let old = self.native;
        self.switch_laser(on);
        if dx.abs() == dy.abs() {
            self.properties.engage_both();
            if dx > 0 {
                if self.properties.leftward() {
                    self.push(CODE_RIGHT);
                    self.properties.unset(Properties::LEFTWARD);
                }
            } else if !self.properties.leftward() {
                self.push(CODE_LEFT);
                self.properties.set(Properties::LEFTWARD);
            }
            if dy > 0 {
                if self.properties.topward() {
                    self.push(CODE_BOTTOM);
                    self.properties.unset(Properties::TOPWARD);
                }
            } else if !self.properties.topward() {
                self.push(CODE_TOP);
                self.properties.set(Properties::TOPWARD);
            }
            self.native.x += dx;
            self.native.y += dy;
            self.push(CODE_ANGLE);
            self.push_distance(dy);
        } else {
            self.goto_xy(dx, dy);
        }
        self.signal_position(old);
    }

    /// Relative move appropriate to the current mode
    fn goto_relative(&mut self, dx: i64, dy: i64, cut: bool) {
        if dx == 0 && dy == 0 {
            return;
        }
        let old = self.native;
        match self.state {
            DriverMode::Rapid => self.move_in_rapid_mode(dx, dy, cut),
            DriverMode::Raster => {
                self.enter_program(0, 0);
                self.goto_relative(dx, dy, cut);
                return;
            }
            DriverMode::Program => {
                let mut last = NativePosition::default();
                for point in grouped_line(dx, dy) {
                    self.goto_octent(point.x - last.x, point.y - last.y, cut);
                    last = point;
                }
            }
            DriverMode::Finish => {
                self.goto_xy(dx, dy);
                self.push(b"N");
            }
            DriverMode::ModeChange => self.mode_shift_on_the_fly(dx, dy),
        }
        self.signal_position(old);
    }

    fn move_absolute(&mut self, x: i64, y: i64) {
        self.goto_relative(x - self.native.x, y - self.native.y, false);
    }

    fn move_in_rapid_mode(&mut self, dx: i64, dy: i64, cut: bool) {
        if self.config.rapid_override {
            let speed_x = self.config.rapid_override_speed_x;
            let speed_y = self.config.rapid_override_speed_y;
            self.set_acceleration(None);
            self.set_step(0.0, 0.0);
            if dx != 0 {
                self.enter_rapid();
                self.set_speed(speed_x);
                self.enter_program(0, 0);
                self.goto_octent(dx, 0, cut);
            }
            if dy != 0 {
                if dx == 0 || speed_x != speed_y {
                    self.enter_rapid();
                    self.set_speed(speed_y);
                    self.enter_program(0, 0);
                }
                self.goto_octent(0, dy, cut);
            }
            self.enter_rapid();
        } else {
            self.push(b"I");
            self.goto_xy(dx, dy);
            self.push(b"S1P\n");
            if !self.config.autolock {
                self.push(b"IS2P\n");
            }
        }
    }

    fn jog_relative(&mut self, dx: i64, dy: i64, mode: JogMode) {
        self.switch_laser(false);
        match mode {
            JogMode::Nse => self.nse_jog(dx, dy),
            JogMode::ModeShift => self.mode_shift_on_the_fly(dx, dy),
            JogMode::FinishOut => {
                self.enter_rapid();
                self.goto_relative(dx, dy, false);
                self.enter_program(0, 0);
            }
        }
    }

    /// Jog out of a program through a temporary rapid
    ///
    /// The program stays declared; directions are re-declared afterwards.
    fn nse_jog(&mut self, dx: i64, dy: i64) {
        let old = self.native;
        let original = self.state;
        self.state = DriverMode::Rapid;
        self.laser = false;
        if self.properties.horizontal_major() {
            if !self.properties.is_left() && dx >= 0 {
                self.push(CODE_LEFT);
            }
            if !self.properties.is_right() && dx <= 0 {
                self.push(CODE_RIGHT);
            }
        } else {
            if !self.properties.is_top() && dy >= 0 {
                self.push(CODE_TOP);
            }
            if !self.properties.is_bottom() && dy <= 0 {
                self.push(CODE_BOTTOM);
            }
        }
        self.push(b"N");
        self.goto_xy(dx, dy);
        self.push(b"SE");
        let directions = self.properties.declare();
        self.push(&directions);
        self.state = original;
        self.signal_position(old);
    }

    /// Move to absolute native coordinates in rapid mode
    pub fn move_native(&mut self, x: i64, y: i64) -> Result<()> {
        self.enter_rapid();
        self.move_absolute(x, y);
        self.commit()
    }

    /// Move to an absolute physical position
    pub fn move_abs(&mut self, x_mm: f64, y_mm: f64) -> Result<()> {
        let target = self.space.physical_to_device_position(x_mm, y_mm);
        self.move_native(target.x, target.y)
    }

    /// Move by a physical displacement
    pub fn move_rel(&mut self, dx_mm: f64, dy_mm: f64) -> Result<()> {
        let (dx, dy) = self.space.physical_to_device_length(dx_mm, dy_mm);
        self.enter_rapid();
        self.goto_relative(dx, dy, false);
        self.commit()
    }

    /// Move to a physical position relative to the origin
    pub fn move_ori(&mut self, x_mm: f64, y_mm: f64) -> Result<()> {
        let offset = self.space.physical_to_device_position(x_mm, y_mm);
        self.move_native(self.origin.x + offset.x, self.origin.y + offset.y)
    }

    /// Jog to native coordinates using the configured jog strategy
    ///
    /// Targets are relative when relative mode is set. Outside a program
    /// the jog is a plain rapid move.
    pub fn jog(&mut self, x: i64, y: i64) -> Result<()> {
        let (dx, dy) = if self.is_relative {
            (x, y)
        } else {
            (x - self.native.x, y - self.native.y)
        };
        if self.state == DriverMode::Program {
            self.jog_relative(dx, dy, self.config.opt_jog_mode);
        } else {
            self.enter_rapid();
            self.goto_relative(dx, dy, false);
        }
        self.commit()
    }

    /// Home the head
    pub fn home(&mut self) -> Result<()> {
        self.enter_rapid();
        self.push(b"IPP\n");
        let old = self.native;
        self.native = NativePosition::default();
        self.reset_modes();
        self.planner.reset();
        self.state = DriverMode::Rapid;
        self.signal_mode();
        self.signal_position(old);
        self.commit()
    }

    /// Lock the rail
    pub fn lock_rail(&mut self) -> Result<()> {
        self.enter_rapid();
        self.push(b"IS1P\n");
        self.commit()
    }

    /// Unlock the rail so the head moves freely
    pub fn unlock_rail(&mut self) -> Result<()> {
        self.enter_rapid();
        self.push(b"IS2P\n");
        self.commit()
    }

    /// Fire the laser in place
    pub fn dwell(&mut self, time_ms: u64) -> Result<()> {
        self.enter_rapid();
        self.commit()?;
        self.wait_finish();
        self.wait_for_holds()?;
        self.laser_on()?;
        self.wait(time_ms);
        self.laser_off()?;
        Ok(())
    }

    pub fn set_origin(&mut self, x: i64, y: i64) {
        self.origin = NativePosition::new(x, y);
    }

    /// Publish `x=..;y=..;speed=..;power=..`
    pub fn status(&self) -> String {
        let status = format!(
            "x={};y={};speed={};power={}",
            self.native.x, self.native.y, self.settings.speed, self.settings.power
        );
        self.events.publish(DriverEvent::Status(status.clone()));
        status
    }

    /// Forward pre-encoded data
    pub fn blob(&mut self, blob_type: BlobType, data: &[u8]) -> Result<()> {
        match blob_type {
            BlobType::Egv => self.push(data),
        }
        self.commit()
    }

    /// Abort the current board command
    pub fn abort(&mut self) -> Result<()> {
        self.realtime.abort()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.realtime.pause()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.realtime.resume()
    }

    /// Reset the board and drop all work
    pub fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.sink.lock().write(RESET)?;
        self.discard_work();
        Ok(())
    }

    /// Drop the plan, temporary holds and staged bytes and fall back to rapid
    ///
    /// Handles a reset requested through the realtime handle; the reset
    /// bytes have already been written.
    pub fn discard_work(&mut self) {
        self.planner.reset();
        self.holds.clear_temporary();
        self.pending.clear();
        self.step_total.reset();
        self.events.publish(DriverEvent::BufferLevel(0));
        self.reset_modes();
        self.state = DriverMode::Rapid;
        self.signal_mode();
        self.cancel.store(false, Ordering::SeqCst);
        tracing::debug!("Driver work discarded");
    }

    // ---------------------------------------------------------------------
    // Raster switching
    // ---------------------------------------------------------------------

    /// Horizontal line switch for NSE stepping
    ///
    /// `N..SE` steps by the set amount on its own; any remaining difference
    /// is commanded inside the sequence.
    fn h_switch(&mut self, dy: f64) {
        let delta = self.step_total.advance(dy);
        let step_amount = if self.properties.topward() {
            -self.step_value_set
        } else {
            self.step_value_set
        };
        let delta = delta - step_amount;

        self.push(if self.properties.leftward() {
            CODE_LEFT
        } else {
            CODE_RIGHT
        });
        self.push(b"N");
        if delta != 0 {
            if delta < 0 {
                self.push(CODE_TOP);
                self.properties.set(Properties::TOPWARD);
            } else {
                self.push(CODE_BOTTOM);
                self.properties.unset(Properties::TOPWARD);
            }
            self.push_distance(delta);
            self.native.y += delta;
        }
        self.push(b"SE");
        self.native.y += step_amount;

        self.properties.toggle(Properties::LEFTWARD);
        self.properties.engage_x();
        self.laser = false;
        self.step_index += 1;
    }

    /// Vertical line switch for NSE stepping
    fn v_switch(&mut self, dx: f64) {
        let delta = self.step_total.advance(dx);
        let step_amount = if self.properties.leftward() {
            -self.step_value_set
        } else {
            self.step_value_set
        };
        let delta = delta - step_amount;

        self.push(if self.properties.topward() {
            CODE_TOP
        } else {
            CODE_BOTTOM
        });
        self.push(b"N");
        if delta != 0 {
            if delta < 0 {
                self.push(CODE_LEFT);
                self.properties.set(Properties::LEFTWARD);
            } else {
                self.push(CODE_RIGHT);
                self.properties.unset(Properties::LEFTWARD);
            }
            self.push_distance(delta);
            self.native.x += delta;
        }
        self.push(b"SE");
        self.native.x += step_amount;

        self.properties.toggle(Properties::TOPWARD);
        self.properties.engage_y();
        self.laser = false;
        self.step_index += 1;
    }

    /// Horizontal line switch with firmware stepping
    ///
    /// Reversing direction steps by the set amount. A step that differs
    /// from it is only possible from a fresh raster program, so the driver
    /// finishes, moves and re-enters.
    fn h_switch_g(&mut self, dy: f64) {
        let delta = self.step_total.advance(dy);
        let step_amount = if self.properties.topward() {
            -self.step_value_set
        } else {
            self.step_value_set
        };
        let delta = delta - step_amount;
        if delta != 0 {
            self.enter_finished();
            self.goto_relative(0, delta, false);
            self.properties.engage_x();
            self.enter_raster();
        }

        if self.properties.leftward() {
            self.push(CODE_RIGHT);
            self.properties.unset(Properties::LEFTWARD);
        } else {
            self.push(CODE_LEFT);
            self.properties.set(Properties::LEFTWARD);
        }
        self.native.y += step_amount;
        self.laser = false;
        self.step_index += 1;
    }

    /// Vertical line switch with firmware stepping
    fn v_switch_g(&mut self, dx: f64) {
        let delta = self.step_total.advance(dx);
        let step_amount = if self.properties.leftward() {
            -self.step_value_set
        } else {
            self.step_value_set
        };
        let delta = delta - step_amount;
        if delta != 0 {
            self.enter_finished();
            self.goto_relative(delta, 0, false);
            self.properties.engage_y();
            self.enter_raster();
        }

        if self.properties.topward() {
            self.push(CODE_BOTTOM);
            self.properties.unset(Properties::TOPWARD);
        } else {
            self.push(CODE_TOP);
            self.properties.set(Properties::TOPWARD);
        }
        self.native.x += step_amount;
        self.laser = false;
        self.step_index += 1;
    }

    // ---------------------------------------------------------------------
    // Plotting
    // ---------------------------------------------------------------------

    /// Hand a cut primitive to the driver
    ///
    /// Geometry is queued on the planner; device actions first run the
    /// queued geometry and then execute directly.
    pub fn plot(&mut self, cut: CutPrimitive) -> Result<()> {
        match cut {
            CutPrimitive::Input { .. } | CutPrimitive::Output { .. } => {
                self.plot_start()?;
                self.wait_finish();
                tracing::warn!("Board has no GPIO, ignoring {:?}", cut);
            }
            CutPrimitive::Dwell {
                start,
                dwell_time_ms,
            } => {
                self.plot_start()?;
                self.move_native(start.x, start.y)?;
                self.wait_finish();
                self.dwell(dwell_time_ms)?;
            }
            CutPrimitive::Wait { dwell_time_ms } => {
                self.plot_start()?;
                self.wait_finish();
                self.wait_for_holds()?;
                self.wait(dwell_time_ms);
            }
            CutPrimitive::Home => {
                self.plot_start()?;
                self.wait_finish();
                self.wait_for_holds()?;
                self.home()?;
            }
            CutPrimitive::Goto { start } => {
                self.plot_start()?;
                self.wait_finish();
                let (x, y) = (self.origin.x + start.x, self.origin.y + start.y);
                self.move_absolute(x, y);
                self.commit()?;
            }
            CutPrimitive::SetOrigin { start, set_current } => {
                self.plot_start()?;
                let position = match start {
                    Some(start) if !set_current => start,
                    _ => self.native,
                };
                self.set_origin(position.x, position.y);
            }
            geometry => self.planner.push(geometry),
        }
        Ok(())
    }

    /// Run every queued primitive through the planner and out to the sink
    pub fn plot_start(&mut self) -> Result<()> {
        if self.planner.is_idle() {
            return Ok(());
        }
        self.planner.set_position(self.native);
        loop {
            self.wait_for_holds()?;
            let event = self.planner.next_event();
            let finished = self.process_event(&event);
            self.commit()?;
            if finished {
                return Ok(());
            }
        }
    }

    /// Consume one planner event, `true` once the batch is finished
    fn process_event(&mut self, event: &PlannerEvent) -> bool {
        if event.is_control() {
            let flag = event.flag;
            if flag & PLOT_FINISH != 0 {
                self.enter_rapid();
                return true;
            } else if flag & PLOT_SETTING != 0 {
                if let Some(settings) = event.settings.as_deref() {
                    self.apply_settings(settings);
                }
            } else if flag & PLOT_AXIS != 0 {
                // 0 is horizontal major, 1 vertical.
                self.staged.horizontal_major = Some(event.x == 0);
            } else if flag & PLOT_DIRECTION != 0 {
                self.staged.leftward = Some(event.x != 1);
                self.staged.topward = Some(event.y != 1);
            } else if flag & (PLOT_RAPID | PLOT_JOG) != 0 {
                if flag & PLOT_RAPID != 0 || self.state != DriverMode::Program {
                    self.enter_rapid();
                    self.move_absolute(event.x, event.y);
                } else {
                    let (dx, dy) = (event.x - self.native.x, event.y - self.native.y);
                    self.jog_relative(dx, dy, self.config.opt_jog_mode);
                }
            }
            return false;
        }

        let (x, y) = (event.x, event.y);
        let mut dx = x - self.native.x;
        let mut dy = y - self.native.y;
        if !self.settings.is_raster() {
            self.enter_program(0, 0);
        } else {
            self.enter_raster();
            // Unidirectional lines reverse twice per line, so every step is
            // commanded inside `N..SE`.
            let nse =
                self.config.nse_raster || self.settings.raster_alt || self.settings.raster_swing;
            if self.properties.horizontal_major() {
                if nse {
                    let leftward = self.properties.leftward();
                    if (dx > 0 && leftward) || (dx < 0 && !leftward) {
                        self.h_switch(dy as f64);
                    }
                } else if dy != 0 {
                    self.h_switch_g(dy as f64);
                }
            } else if nse {
                let topward = self.properties.topward();
                if (dy > 0 && topward) || (dy < 0 && !topward) {
                    self.v_switch(dx as f64);
                }
            } else if dx != 0 {
                self.v_switch_g(dx as f64);
            }
            dx = x - self.native.x;
            dy = y - self.native.y;
        }
        self.goto_octent(dx, dy, event.is_on());
        false
    }
}

impl std::fmt::Debug for LihuiyuDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LihuiyuDriver")
            .field("board", &self.config.board)
            .field("state", &self.state)
            .field("native", &self.native)
            .field("laser", &self.laser)
            .finish()
    }
}

/// Corner points of a rasterized line from the origin to `(dx, dy)`
///
/// Consecutive unit steps in the same heading merge into one point.
fn grouped_line(dx: i64, dy: i64) -> Vec<NativePosition> {
    let mut corners = Vec::new();
    let mut last = NativePosition::default();
    let mut heading = None;
    for point in LineWalk::new(NativePosition::default(), NativePosition::new(dx, dy)) {
        let step = (point.x - last.x, point.y - last.y);
        if heading.is_some() && heading != Some(step) {
            corners.push(last);
        }
        heading = Some(step);
        last = point;
    }
    if heading.is_some() {
        corners.push(last);
    }
    corners
}
