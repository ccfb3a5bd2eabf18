//! One-time-programmable storage boundary: the lockable secret partition.
//!
//! # Secret partition layout
//!
//! ```text
//! offset  size  slot
//!      0    16  RmaToken              (digest of the RMA unlock token)
//!     16    32  CreatorRootKeyShare0
//!     48    32  CreatorRootKeyShare1
//! ```
//!
//! Once the lock is issued the partition is unreadable and unwritable by
//! software for the rest of the device's life.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size of one creator root key share.
pub const ROOT_KEY_SHARE_SIZE: usize = 32;

/// Size of the RMA unlock token and of its stored digest.
pub const RMA_TOKEN_SIZE: usize = 16;

/// Total programmable size of the secret partition.
pub const SECRET_PARTITION_SIZE: usize = RMA_TOKEN_SIZE + 2 * ROOT_KEY_SHARE_SIZE;

/// Lock state of the secret partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretPartitionState {
    Unlocked,
    Locked,
}

/// Slots of the secret partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtpSlot {
    RmaToken,
    CreatorRootKeyShare0,
    CreatorRootKeyShare1,
}

impl OtpSlot {
    /// All slots in offset order.
    pub const ALL: [OtpSlot; 3] = [
        OtpSlot::RmaToken,
        OtpSlot::CreatorRootKeyShare0,
        OtpSlot::CreatorRootKeyShare1,
    ];

    pub const fn offset(self) -> usize {
        match self {
            OtpSlot::RmaToken => 0,
            OtpSlot::CreatorRootKeyShare0 => RMA_TOKEN_SIZE,
            OtpSlot::CreatorRootKeyShare1 => RMA_TOKEN_SIZE + ROOT_KEY_SHARE_SIZE,
        }
    }

    pub const fn size(self) -> usize {
        match self {
            OtpSlot::RmaToken => RMA_TOKEN_SIZE,
            OtpSlot::CreatorRootKeyShare0 | OtpSlot::CreatorRootKeyShare1 => ROOT_KEY_SHARE_SIZE,
        }
    }
}

impl fmt::Display for OtpSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:#04x}", self, self.offset())
    }
}

/// OTP controller failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("slot {0} already programmed")]
    SlotAlreadyProgrammed(OtpSlot),

    #[error("secret partition is locked")]
    PartitionLocked,

    #[error("slot {slot} expects {expected} bytes, got {actual}")]
    LengthMismatch {
        slot: OtpSlot,
        expected: usize,
        actual: usize,
    },

    #[error("OTP controller fault: {0}")]
    Controller(String),
}

/// OTP controller operations on the secret partition.
pub trait OtpController {
    /// Program one slot. Slots are not erasable; a second write fails.
    fn write_secret(&mut self, slot: OtpSlot, data: &[u8]) -> Result<(), OtpError>;

    /// Whether a slot holds programmed content. Only meaningful while unlocked.
    fn is_slot_programmed(&self, slot: OtpSlot) -> Result<bool, OtpError>;

    fn secret_partition_state(&self) -> Result<SecretPartitionState, OtpError>;

    /// Terminal, irreversible lock of the secret partition.
    fn lock_secret_partition(&mut self) -> Result<(), OtpError>;
}
