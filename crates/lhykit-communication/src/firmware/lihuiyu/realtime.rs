//! Realtime commands
//!
//! Pause, resume, reset and abort bypass holds and the mode machinery. They
//! lock the shared sink for one write, so they land between driver fragments
//! and never inside one.

use crate::communication::SharedSink;
use lhykit_core::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) const PAUSE: &[u8] = b"~PN!\n~";
pub(crate) const RESUME: &[u8] = b"~PN&\n~";
pub(crate) const RESET: &[u8] = b"~I*\n~";
pub(crate) const ABORT: &[u8] = b"I\n";

/// Cloneable handle for out-of-band control of a driver
#[derive(Clone)]
pub struct RealtimeHandle {
    sink: SharedSink,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    resets: Arc<AtomicU64>,
}

impl RealtimeHandle {
    pub(crate) fn new(sink: SharedSink, cancel: Arc<AtomicBool>) -> Self {
        Self {
            sink,
            cancel,
            paused: Arc::new(AtomicBool::new(false)),
            resets: Arc::new(AtomicU64::new(0)),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.sink.lock().write(bytes)?;
        Ok(())
    }

    /// Ask the board to pause
    pub fn pause(&self) -> Result<()> {
        self.write(PAUSE)?;
        self.paused.store(true, Ordering::SeqCst);
        tracing::debug!("Realtime pause");
        Ok(())
    }

    /// Ask the board to resume
    pub fn resume(&self) -> Result<()> {
        self.write(RESUME)?;
        self.paused.store(false, Ordering::SeqCst);
        tracing::debug!("Realtime resume");
        Ok(())
    }

    /// Reset the board and cancel all queued and in-flight work
    pub fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        tracing::debug!("Realtime reset requested");
        self.write(RESET)
    }

    /// Abort the current board command
    pub fn abort(&self) -> Result<()> {
        self.write(ABORT)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Resets requested through any clone of this handle
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    /// Whether a reset is waiting to be handled by the driver
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RealtimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeHandle")
            .field("cancel", &self.is_cancel_requested())
            .field("paused", &self.is_paused())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::{shared_sink, BufferedPipe};

    #[test]
    fn test_realtime_sequences() {
        let pipe = BufferedPipe::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = RealtimeHandle::new(shared_sink(pipe.clone()), Arc::clone(&cancel));

        handle.pause().unwrap();
        assert!(handle.is_paused());
        handle.resume().unwrap();
        assert!(!handle.is_paused());
        handle.abort().unwrap();
        assert!(!cancel.load(Ordering::SeqCst));
        handle.reset().unwrap();
        assert!(cancel.load(Ordering::SeqCst));
        assert_eq!(handle.clone().reset_count(), 1);

        assert_eq!(pipe.drain(), b"~PN!\n~~PN&\n~I\n~I*\n~".to_vec());
    }

    #[test]
    fn test_reset_sets_cancel_even_if_write_fails() {
        let pipe = BufferedPipe::new();
        pipe.shutdown();
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = RealtimeHandle::new(shared_sink(pipe), Arc::clone(&cancel));

        assert!(handle.reset().is_err());
        assert!(handle.is_cancel_requested());
    }
}
