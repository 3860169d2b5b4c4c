//! # LhyKit
//!
//! Planner and device driver for Lihuiyu-board (K40 style) laser cutters.
//!
//! ## Architecture
//!
//! LhyKit is organized as a workspace with multiple crates:
//!
//! 1. **lhykit-core** - Laser settings, driver modes, positions, events, errors
//! 2. **lhykit-settings** - Device configuration, JSON and TOML persistence
//! 3. **lhykit-planner** - Cut primitives and the plot planner
//! 4. **lhykit-communication** - Output sinks, the Lihuiyu driver and its worker
//! 5. **lhykit** - Main binary that wires the crates together
//!
//! ## Pipeline
//!
//! Cut primitives are queued on the driver, discretized by the plot planner
//! into unit steps and control events, and turned by the driver state
//! machine into LHYMICRO-GL bytes on an output sink.

pub use lhykit_communication::{
    decode_distance, encode_distance, shared_sink, BlobType, BufferedPipe, Clock, DeviceSpace,
    DriverCommand, DriverSetting, DriverWorker, Hold, HoldController, LihuiyuDriver, OutputSink,
    RealtimeHandle, RecordingClock, SharedSink, SpeedCodeProvider, SpeedCodeRequest,
    StaticSpeedCode, StepAccumulator, SystemClock,
};

pub use lhykit_core::{
    ConnectionError, DriverEvent, DriverMode, Error, EventDispatcher, LaserSettings,
    NativePosition, PlannerError, ProtocolError, Result,
};

pub use lhykit_planner::{
    CutCommon, CutPrimitive, MajorAxis, PlannerEvent, PlotPlanner, PlotPoint, RasterDirection,
    RasterImage,
};

pub use lhykit_settings::{DeviceConfig, JogMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Protocol bytes go to stdout, so logs go to stderr.
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
