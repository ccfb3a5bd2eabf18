//! Error taxonomy for device personalization.
//!
//! Each stage of a session has its own error type. `ProvisioningError` wraps
//! them and classifies every failure with a [`Disposition`] so the line can
//! tell a unit that may simply be re-run from one that must be quarantined.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ecc::EccError;
use crate::entropy::EntropyError;
use crate::flash::{FlashError, InfoPage};
use crate::lifecycle::{LifecycleError, LifecycleState};
use crate::otp::{OtpError, OtpSlot};
use crate::state::{ErrorKind, SessionState, StateError};

/// Environment checks performed before anything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("lifecycle state {0} does not permit personalization")]
    InvalidLifecycleState(LifecycleState),

    #[error("hardware random source is not reachable")]
    RandomSourceUnavailable,

    #[error("lifecycle controller unreadable: {0}")]
    LifecycleUnreadable(#[from] LifecycleError),

    #[error("configured host public key rejected: {0}")]
    HostKeyRejected(String),
}

/// Secret material generation failures. Fatal for the session, nothing written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("entropy exhausted while drawing {what}: {source}")]
    EntropyExhausted {
        what: &'static str,
        #[source]
        source: EntropyError,
    },

    #[error("random source returned a degenerate value for {what}")]
    DegenerateEntropy { what: &'static str },

    #[error("key derivation failed: {0}")]
    KeyDerivationFailure(EccError),

    #[error("RMA token wrapping failed: {0}")]
    TokenWrapFailure(String),
}

/// Non-volatile write failures. The storage is write-once, so never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("flash write to {page} failed: {source}")]
    FlashWriteFailure {
        page: InfoPage,
        #[source]
        source: FlashError,
    },

    #[error("OTP write to {slot} failed: {source}")]
    OtpWriteFailure {
        slot: OtpSlot,
        #[source]
        source: OtpError,
    },
}

/// Lock failures. Secrets are written but the partition is not locked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("secret partition lock command rejected: {0}")]
    LockCommandFailure(OtpError),

    #[error("lock command accepted but partition still reads unlocked")]
    LockNotObserved,
}

/// Read failures on the query paths. Never means "not provisioned".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("secret partition state unknown: {0}")]
    PartitionStateUnreadable(OtpError),

    #[error("programmed state of {slot} unknown: {source}")]
    SlotStateUnreadable {
        slot: OtpSlot,
        #[source]
        source: OtpError,
    },

    #[error("programmed state of {page} unknown: {source}")]
    PageStateUnreadable {
        page: InfoPage,
        #[source]
        source: FlashError,
    },
}

/// What the manufacturing line should do with a unit after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Nothing written; fix the environment (lifecycle, random source) first.
    Remediate,
    /// Nothing written; the whole session may be run again.
    RetrySession,
    /// Secrets written but lock unconfirmed; only the lock may be re-issued.
    RetryLockOnly,
    /// Write-once storage is in an unknown or partial state.
    Quarantine,
}

/// Top-level personalization error.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    #[error("lock failed: {0}")]
    Lock(#[from] LockError),

    /// Query failed before any write was attempted
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    /// Query failed after the lock command was issued
    #[error("post-lock verification unreadable: {0}")]
    Verification(QueryError),

    #[error(
        "secret storage partially programmed by an earlier session \
         (pages: {programmed_pages:?}, slots: {programmed_slots:?})"
    )]
    PartiallyProvisioned {
        programmed_pages: Vec<InfoPage>,
        programmed_slots: Vec<OtpSlot>,
    },

    #[error("session state machine violated: {0}")]
    Session(#[from] StateError),
}

impl ProvisioningError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ProvisioningError::Precondition(_) => Disposition::Remediate,
            ProvisioningError::Generation(_) | ProvisioningError::Query(_) => {
                Disposition::RetrySession
            }
            ProvisioningError::Lock(_) | ProvisioningError::Verification(_) => {
                Disposition::RetryLockOnly
            }
            ProvisioningError::Write(_)
            | ProvisioningError::PartiallyProvisioned { .. }
            | ProvisioningError::Session(_) => Disposition::Quarantine,
        }
    }

    /// Failure class recorded in the session state machine.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisioningError::Precondition(_) => ErrorKind::Precondition,
            ProvisioningError::Generation(_) => ErrorKind::Generation,
            ProvisioningError::Write(_) => ErrorKind::Write,
            ProvisioningError::Lock(_) => ErrorKind::Lock,
            ProvisioningError::Query(_) => ErrorKind::Query,
            ProvisioningError::Verification(_) => ErrorKind::Verification,
            ProvisioningError::PartiallyProvisioned { .. } => ErrorKind::PartiallyProvisioned,
            ProvisioningError::Session(_) => ErrorKind::Session,
        }
    }

    /// Whether this session issued any non-volatile write before failing.
    ///
    /// A state machine violation is judged by the transition that was
    /// refused. Every stage writes before recording its state, so only a
    /// refusal out of `Start`, `ShortCircuitDone` or a non-resume
    /// `GateChecked` edge is known to precede the first write.
    pub fn writes_started(&self) -> bool {
        match self {
            ProvisioningError::Write(_)
            | ProvisioningError::Lock(_)
            | ProvisioningError::Verification(_) => true,
            ProvisioningError::Session(StateError::InvalidTransition { from, to }) => match from {
                SessionState::Start | SessionState::ShortCircuitDone => false,
                SessionState::GateChecked => *to == SessionState::Locked,
                _ => true,
            },
            ProvisioningError::Precondition(_)
            | ProvisioningError::Generation(_)
            | ProvisioningError::Query(_)
            | ProvisioningError::PartiallyProvisioned { .. } => false,
        }
    }

    /// Whether re-running the whole session is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.disposition(),
            Disposition::Remediate | Disposition::RetrySession
        )
    }
}
