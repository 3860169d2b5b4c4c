//! In-memory output pipe with consumption tracking
//!
//! Bytes written to a [`BufferedPipe`] stay buffered until a consumer
//! drains them, so `len()` behaves like the fill level of a device buffer.
//! Clones share the same buffer: the driver writes through one handle and a
//! device simulation drains through another.

use crate::communication::OutputSink;
use lhykit_core::{thread_safe, ConnectionError, ThreadSafe};

#[derive(Debug, Default)]
struct PipeState {
    /// Written, not yet consumed
    buffer: Vec<u8>,
    /// Total bytes ever written
    written: usize,
    shutdown: bool,
}

/// Shared in-memory output pipe
#[derive(Debug, Clone, Default)]
pub struct BufferedPipe {
    state: ThreadSafe<PipeState>,
}

impl BufferedPipe {
    /// Create an empty pipe
    pub fn new() -> Self {
        Self {
            state: thread_safe(PipeState::default()),
        }
    }

    /// Take every buffered byte, as the device would when it consumes them
    pub fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().buffer)
    }

    /// Consume up to `count` bytes from the front of the buffer
    pub fn consume(&self, count: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        let count = count.min(state.buffer.len());
        state.buffer.drain(..count).collect()
    }

    /// Copy of the buffered bytes without consuming them
    pub fn peek(&self) -> Vec<u8> {
        self.state.lock().buffer.clone()
    }

    /// Total bytes written since creation
    pub fn total_written(&self) -> usize {
        self.state.lock().written
    }

    /// Shut the pipe down; further writes fail
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        tracing::debug!(
            "Output pipe shut down with {} bytes buffered",
            state.buffer.len()
        );
    }
}

impl OutputSink for BufferedPipe {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(ConnectionError::WriteFailed {
                reason: "pipe is shut down".to_string(),
            });
        }
        state.buffer.extend_from_slice(bytes);
        state.written += bytes.len();
        Ok(())
    }

    fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_drain() {
        let pipe = BufferedPipe::new();
        let mut writer = pipe.clone();
        writer.write(b"IPP\n").unwrap();
        writer.write(b"IS1P\n").unwrap();

        assert_eq!(pipe.len(), 9);
        assert_eq!(pipe.consume(4), b"IPP\n".to_vec());
        assert_eq!(pipe.drain(), b"IS1P\n".to_vec());
        assert!(pipe.is_empty());
        assert_eq!(pipe.total_written(), 9);
    }

    #[test]
    fn test_consume_past_end() {
        let mut pipe = BufferedPipe::new();
        pipe.write(b"ab").unwrap();
        assert_eq!(pipe.consume(10), b"ab".to_vec());
        assert!(pipe.consume(1).is_empty());
    }

    #[test]
    fn test_shutdown_rejects_writes() {
        let mut pipe = BufferedPipe::new();
        pipe.write(b"I").unwrap();
        pipe.shutdown();

        assert!(pipe.is_shutdown());
        assert!(matches!(
            pipe.write(b"U"),
            Err(ConnectionError::WriteFailed { .. })
        ));
        assert_eq!(pipe.peek(), b"I".to_vec());
    }
}
