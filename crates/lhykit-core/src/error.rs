//! Error handling for LhyKit
//!
//! Provides error types for all layers of the driver stack:
//! - Protocol errors (values the byte protocol cannot express)
//! - Connection errors (output sink failures)
//! - Planner errors (malformed cut primitives)
//!
//! Backpressure and cancellation are deliberately not failures. Holds block
//! the worker instead of erroring, and `Error::Cancelled` only unwinds the
//! event loop after a reset so the worker can discard the plan.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Protocol error type
///
/// Raised when a value cannot be expressed in the Lihuiyu byte protocol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The distance codec only encodes non-negative travel.
    #[error("Cannot encode negative distance {value}")]
    NegativeDistance {
        /// The rejected distance in device units.
        value: i64,
    },

    /// Raster step must be finite and non-negative
    #[error("Invalid raster step {step}")]
    InvalidRasterStep {
        /// The rejected step.
        step: f64,
    },

    /// Blob type the driver cannot forward
    #[error("Unsupported blob type: {blob_type}")]
    UnsupportedBlob {
        /// The blob type name.
        blob_type: String,
    },
}

/// Connection error type
///
/// Represents failures of the output sink that carries protocol bytes to
/// the device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// The sink reported shutdown while the driver was waiting on it.
    #[error("Connection aborted: {reason}")]
    ConnectionAborted {
        /// Why the connection was aborted.
        reason: String,
    },

    /// A write to the sink failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason for the failure.
        reason: String,
    },

    /// No sink is attached
    #[error("Output sink not connected")]
    NotConnected,
}

/// Planner error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    /// Raster image without pixels
    #[error("Raster image is empty")]
    EmptyImage,

    /// Pixel buffer does not match the declared dimensions
    #[error("Pixel buffer holds {actual} pixels, expected {expected}")]
    PixelCountMismatch {
        /// width * height
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },
}

/// Main error type for LhyKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Planner error
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Work was cancelled by a reset request.
    #[error("Cancelled")]
    Cancelled,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error should abort the running job without retry
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::NegativeDistance { value: -3 };
        assert_eq!(err.to_string(), "Cannot encode negative distance -3");

        let err: Error = ConnectionError::ConnectionAborted {
            reason: "pipe shut down".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Connection aborted: pipe shut down");
    }

    #[test]
    fn test_error_classification() {
        let aborted: Error = ConnectionError::NotConnected.into();
        assert!(aborted.is_fatal());
        assert!(aborted.is_connection_error());

        assert!(!Error::Cancelled.is_fatal());
        assert!(Error::Cancelled.is_cancelled());

        let negative: Error = ProtocolError::NegativeDistance { value: -1 }.into();
        assert!(!negative.is_fatal());
    }
}
