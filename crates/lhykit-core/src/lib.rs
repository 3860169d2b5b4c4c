//! # LhyKit Core
//!
//! Core types and utilities for LhyKit.
//! Provides the error taxonomy, laser settings, driver modes and positions,
//! unit conversion and the driver event dispatcher.

pub mod core;
pub mod data;
pub mod error;
pub mod types;
pub mod units;

pub use self::core::{DriverEvent, EventDispatcher};

pub use data::{DriverMode, LaserSettings, NativePosition};

pub use error::{ConnectionError, Error, PlannerError, ProtocolError, Result};

// Re-export type aliases for convenience
pub use types::{thread_safe, thread_safe_vec, BoxedIterator, ThreadSafe, ThreadSafeVec};

pub use units::MILS_PER_MM;
