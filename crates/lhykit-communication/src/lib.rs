//! # LhyKit Communication
//!
//! Output sinks and the Lihuiyu protocol driver.
//! The driver consumes plot planner events and writes the board's byte
//! protocol to an [`OutputSink`], honouring backpressure holds and realtime
//! pause, resume and reset requests.

pub mod communication;
pub mod firmware;

pub use communication::{shared_sink, BufferedPipe, OutputSink, SharedSink};

pub use firmware::lihuiyu::{
    distance::{decode_distance, encode_distance},
    BlobType, Clock, DeviceSpace, DriverCommand, DriverSetting, DriverWorker, Hold,
    HoldController, LihuiyuDriver, RealtimeHandle, RecordingClock, SpeedCodeProvider,
    SpeedCodeRequest, StaticSpeedCode, StepAccumulator, SystemClock,
};
