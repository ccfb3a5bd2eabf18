//! Partition locker.

use tracing::{error, info};

use crate::error::LockError;
use crate::otp::OtpController;

/// Issue the terminal lock on the secret partition.
///
/// Callers must only invoke this once every secret slot is written. On
/// failure the secrets are written but unlocked; re-issuing this command is
/// the only safe recovery.
pub fn lock_secret_partition(otp: &mut impl OtpController) -> Result<(), LockError> {
    match otp.lock_secret_partition() {
        Ok(()) => {
            info!("Secret partition lock issued");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Secret partition lock rejected");
            Err(LockError::LockCommandFailure(e))
        }
    }
}
