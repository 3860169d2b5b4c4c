//! Driver notification plumbing

pub mod event;

pub use event::{DriverEvent, EventDispatcher};
