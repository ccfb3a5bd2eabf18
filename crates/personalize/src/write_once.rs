//! Write-once storage region.
//!
//! Models a non-erasable logical slot: it starts blank, accepts exactly one
//! program operation of its exact size, and rejects every later attempt.
//! The simulated flash and OTP controllers are built from these so the
//! write-once rule holds without real hardware.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteOnceError {
    #[error("region already programmed")]
    AlreadyProgrammed,

    #[error("region expects {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RegionState {
    Blank,
    Programmed(Vec<u8>),
}

/// A single write-once slot of fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOnceRegion {
    size: usize,
    state: RegionState,
}

impl WriteOnceRegion {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            state: RegionState::Blank,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_programmed(&self) -> bool {
        matches!(self.state, RegionState::Programmed(_))
    }

    /// Program the region. Length is checked before the slot is consumed, so
    /// a rejected length leaves the region blank.
    pub fn program(&mut self, data: &[u8]) -> Result<(), WriteOnceError> {
        if self.is_programmed() {
            return Err(WriteOnceError::AlreadyProgrammed);
        }
        if data.len() != self.size {
            return Err(WriteOnceError::LengthMismatch {
                expected: self.size,
                actual: data.len(),
            });
        }
        self.state = RegionState::Programmed(data.to_vec());
        Ok(())
    }

    /// Raw contents, for hardware-level inspection in tests.
    pub fn contents(&self) -> Option<&[u8]> {
        match &self.state {
            RegionState::Blank => None,
            RegionState::Programmed(data) => Some(data.as_slice()),
        }
    }
}
