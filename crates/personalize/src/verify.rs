//! Completion verifier.

use tracing::debug;

use crate::error::QueryError;
use crate::otp::{OtpController, SecretPartitionState};

/// Report whether personalization is complete, i.e. the secret partition is
/// locked.
///
/// Read-only and safe in any lifecycle state. A read failure is returned as
/// an error and never reported as `Ok(false)`.
pub fn check_personalization_complete(otp: &impl OtpController) -> Result<bool, QueryError> {
    let state = otp
        .secret_partition_state()
        .map_err(QueryError::PartitionStateUnreadable)?;
    debug!(state = ?state, "Secret partition state read");
    Ok(state == SecretPartitionState::Locked)
}
