//! Lihuiyu (LHYMICRO-GL) board support
//!
//! The driver state machine, its byte codec and the pieces it is assembled
//! from: backpressure holds, direction bookkeeping, raster step carry, the
//! speed-code seam, coordinate conversion and the worker thread.

mod clock;
mod direction;
pub mod distance;
mod driver;
mod holds;
mod realtime;
mod space;
mod speedcode;
mod step;
mod worker;

pub use clock::{Clock, RecordingClock, SystemClock};
pub use direction::{Properties, StagedDirection};
pub use driver::{BlobType, DriverSetting, LihuiyuDriver};
pub use holds::{Hold, HoldController};
pub use realtime::RealtimeHandle;
pub use space::DeviceSpace;
pub use speedcode::{SpeedCodeProvider, SpeedCodeRequest, StaticSpeedCode};
pub use step::StepAccumulator;
pub use worker::{DriverCommand, DriverWorker};
