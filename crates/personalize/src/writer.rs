//! Dual-storage writer.
//!
//! Seeds go to flash info pages first, then the root key shares and the RMA
//! token digest go to the OTP secret partition. Any failure aborts the
//! remaining writes; nothing is retried because the storage is write-once.

use tracing::{error, info};

use crate::error::WriteError;
use crate::flash::{FlashController, InfoPage};
use crate::otp::{OtpController, OtpSlot};
use crate::secrets::{RmaToken, RootKey, SeedPair};

/// Write both seeds to their info pages, creator first.
pub fn write_flash_seeds(
    flash: &mut impl FlashController,
    seeds: &SeedPair,
) -> Result<(), WriteError> {
    let pages = [
        (InfoPage::CreatorSecret, &seeds.creator_seed),
        (InfoPage::OwnerSecret, &seeds.owner_seed),
    ];

    for (page, seed) in pages {
        if let Err(source) = flash.write_info_page(page, seed.expose_secret()) {
            error!(%page, %source, "Flash seed write failed");
            return Err(WriteError::FlashWriteFailure { page, source });
        }
        info!(%page, "Flash seed written");
    }

    Ok(())
}

/// Write the token digest and both root key shares, in partition order.
pub fn write_otp_secrets(
    otp: &mut impl OtpController,
    root_key: &RootKey,
    rma_token: &RmaToken,
) -> Result<(), WriteError> {
    let token_digest = rma_token.digest();
    let slots: [(OtpSlot, &[u8]); 3] = [
        (OtpSlot::RmaToken, &token_digest.expose_secret()[..]),
        (OtpSlot::CreatorRootKeyShare0, &root_key.share0.expose_secret()[..]),
        (OtpSlot::CreatorRootKeyShare1, &root_key.share1.expose_secret()[..]),
    ];

    for (slot, data) in slots {
        if let Err(source) = otp.write_secret(slot, data) {
            error!(%slot, %source, "OTP secret write failed");
            return Err(WriteError::OtpWriteFailure { slot, source });
        }
        info!(%slot, "OTP secret written");
    }

    Ok(())
}

/// Write all secrets: flash seeds, then OTP. The OTP partition is never
/// touched when a seed write fails.
///
/// [`Personalizer`](crate::Personalizer) calls [`write_flash_seeds`] and
/// [`write_otp_secrets`] separately so that `FlashWritten` and `OtpWritten`
/// are recorded between them. This is the single call for drivers that do
/// not keep a session record.
pub fn write(
    flash: &mut impl FlashController,
    otp: &mut impl OtpController,
    seeds: &SeedPair,
    root_key: &RootKey,
    rma_token: &RmaToken,
) -> Result<(), WriteError> {
    write_flash_seeds(flash, seeds)?;
    write_otp_secrets(otp, root_key, rma_token)
}
