//! Bookkeeping for one image transfer.
//!
//! Flow: begin (size checked against slot capacity) → N × accept →
//! complete → marked. Any error leaves the session `Failed` until
//! [`OtaSession::reset`].

use super::OtaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    /// All bytes written and flushed; waiting for the boot mark.
    Written {
        size: u32,
    },
    Marked {
        size: u32,
    },
    Failed,
}

#[derive(Debug)]
pub struct OtaSession {
    state: OtaState,
}

impl OtaSession {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Open a transfer of `declared` bytes into a slot of `capacity` bytes.
    /// Fails without side effects when the image cannot fit.
    pub fn begin(&mut self, declared: u32, capacity: u32) -> Result<(), OtaError> {
        if self.state != OtaState::Idle {
            return Err(OtaError::AlreadyInProgress);
        }
        if declared == 0 {
            return Err(OtaError::EmptyImage);
        }
        if declared > capacity {
            return Err(OtaError::Oversize { declared, capacity });
        }
        self.state = OtaState::Receiving {
            expected_size: declared,
            bytes_written: 0,
        };
        Ok(())
    }

    /// Account for `len` more bytes. Returns the running total.
    pub fn accept(&mut self, len: usize) -> Result<u32, OtaError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(OtaError::NotReceiving);
        };

        let total = u32::try_from(len)
            .ok()
            .and_then(|len| bytes_written.checked_add(len))
            .filter(|total| *total <= expected_size)
            .ok_or(OtaError::Overflow)?;

        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: total,
        };
        Ok(total)
    }

    /// Close the transfer once the body ended. Short bodies are rejected.
    pub fn complete(&mut self) -> Result<u32, OtaError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {
                self.state = OtaState::Written { size: bytes_written };
                Ok(bytes_written)
            }
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } => Err(OtaError::Truncated {
                expected: expected_size,
                received: bytes_written,
            }),
            _ => Err(OtaError::NotReceiving),
        }
    }

    pub fn mark(&mut self) -> Result<u32, OtaError> {
        let OtaState::Written { size } = self.state else {
            return Err(OtaError::NotReceiving);
        };
        self.state = OtaState::Marked { size };
        Ok(size)
    }

    pub fn fail(&mut self) {
        self.state = OtaState::Failed;
    }

    pub fn reset(&mut self) {
        self.state = OtaState::Idle;
    }
}

impl Default for OtaSession {
    fn default() -> Self {
        Self::new()
    }
}
