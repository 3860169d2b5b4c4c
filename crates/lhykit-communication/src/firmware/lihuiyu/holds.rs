//! Backpressure holds
//!
//! A hold pauses background work while it evaluates true. Permanent holds
//! are checked on every cycle; temporary holds are dropped the first time
//! they evaluate false. Realtime work (priority above zero) never holds.

use crate::communication::OutputSink;
use lhykit_core::ConnectionError;

/// Hold conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Buffered bytes exceed `max` while `enabled`
    BufferOverLimit {
        /// Whether limiting is active
        enabled: bool,
        /// Highest fill level that does not hold
        max: usize,
    },
    /// Something is still buffered
    BufferNotEmpty,
}

impl Hold {
    /// Evaluate against the sink
    ///
    /// The buffer limit refuses to wait on a sink that was shut down.
    pub fn evaluate(&self, sink: &dyn OutputSink) -> Result<bool, ConnectionError> {
        match *self {
            Hold::BufferOverLimit { enabled, max } => {
                if sink.is_shutdown() {
                    return Err(ConnectionError::ConnectionAborted {
                        reason: "cannot hold for a shutdown pipe".to_string(),
                    });
                }
                Ok(enabled && sink.len() > max)
            }
            Hold::BufferNotEmpty => Ok(!sink.is_empty()),
        }
    }
}

/// Permanent and temporary holds of one driver
#[derive(Debug, Clone, Default)]
pub struct HoldController {
    permanent: Vec<Hold>,
    temporary: Vec<Hold>,
}

impl HoldController {
    /// Controller with the given permanent holds
    pub fn new(permanent: Vec<Hold>) -> Self {
        Self {
            permanent,
            temporary: Vec::new(),
        }
    }

    /// Add a hold removed once it stops holding
    pub fn add_temporary(&mut self, hold: Hold) {
        self.temporary.push(hold);
    }

    /// Drop all temporary holds
    pub fn clear_temporary(&mut self) {
        self.temporary.clear();
    }

    /// Number of pending temporary holds
    pub fn temporary_len(&self) -> usize {
        self.temporary.len()
    }

    /// Whether work of the given priority must wait
    pub fn hold_work(&mut self, priority: u8, sink: &dyn OutputSink) -> Result<bool, ConnectionError> {
        if priority > 0 {
            return Ok(false);
        }

        let mut holding = false;
        let mut kept = Vec::with_capacity(self.temporary.len());
        for hold in self.temporary.drain(..) {
            if hold.evaluate(sink)? {
                holding = true;
                kept.push(hold);
            }
        }
        self.temporary = kept;
        if holding {
            return Ok(true);
        }

        for hold in &self.permanent {
            if hold.evaluate(sink)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
