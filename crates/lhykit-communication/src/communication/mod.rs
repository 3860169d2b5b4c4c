//! Output sinks
//!
//! The driver writes protocol bytes to an [`OutputSink`]. In the full system
//! the sink is the USB channel to the board; [`BufferedPipe`] is an
//! in-memory stand-in that buffers bytes until a consumer drains them.

pub mod buffered;

pub use buffered::BufferedPipe;

use lhykit_core::{thread_safe, ConnectionError, ThreadSafe};

/// Byte channel towards the device
///
/// `len()` reports the bytes written but not yet consumed by the device and
/// drives backpressure holds.
pub trait OutputSink: Send {
    /// Write one protocol fragment
    fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError>;

    /// Bytes buffered but not yet consumed
    fn len(&self) -> usize;

    /// Whether nothing is buffered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the channel has been shut down
    fn is_shutdown(&self) -> bool {
        false
    }
}

/// Sink shared between the driver and realtime callers
///
/// Locked once per written fragment.
pub type SharedSink = ThreadSafe<Box<dyn OutputSink>>;

/// Wrap a sink for sharing
pub fn shared_sink(sink: impl OutputSink + 'static) -> SharedSink {
    let sink: Box<dyn OutputSink> = Box::new(sink);
    thread_safe(sink)
}
