//! Random source boundary.

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Random source failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntropyError {
    #[error("random source unavailable")]
    Unavailable,

    #[error("entropy exhausted: {requested} bytes requested")]
    Exhausted { requested: usize },

    #[error("random source fault: {0}")]
    Fault(String),
}

/// Hardware (or OS) random number source.
pub trait EntropySource {
    /// Whether software has data access to the generator.
    fn is_available(&self) -> bool;

    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError>;
}

/// Operating system backed random source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn is_available(&self) -> bool {
        true
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| EntropyError::Fault(e.to_string()))
    }
}
