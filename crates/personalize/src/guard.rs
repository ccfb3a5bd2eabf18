//! Idempotency guard and residue inspection.
//!
//! A locked secret partition proves an earlier session finished every write,
//! because the lock is only ever issued after they all succeed. An unlocked
//! partition is inspected for residue left by a session that was reset
//! between its first write and the lock.

use tracing::{info, warn};

use crate::error::QueryError;
use crate::flash::{FlashController, InfoPage};
use crate::otp::{OtpController, OtpSlot, SecretPartitionState};

/// Returns true iff the partition is already locked.
pub fn is_already_provisioned(partition_state: SecretPartitionState) -> bool {
    partition_state == SecretPartitionState::Locked
}

/// Programmed secret locations found on an unlocked device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Residue {
    pub programmed_pages: Vec<InfoPage>,
    pub programmed_slots: Vec<OtpSlot>,
}

impl Residue {
    /// Nothing programmed; a fresh session may run.
    pub fn is_blank(&self) -> bool {
        self.programmed_pages.is_empty() && self.programmed_slots.is_empty()
    }

    /// Every seed page and every secret slot programmed; only the lock is
    /// missing.
    pub fn is_complete(&self) -> bool {
        InfoPage::ALL.iter().all(|p| self.programmed_pages.contains(p))
            && OtpSlot::ALL.iter().all(|s| self.programmed_slots.contains(s))
    }
}

/// Inspect which seed pages and secret slots already hold content.
pub fn inspect_residue(
    flash: &impl FlashController,
    otp: &impl OtpController,
) -> Result<Residue, QueryError> {
    let mut residue = Residue::default();

    for page in InfoPage::ALL {
        let programmed = flash
            .is_info_page_programmed(page)
            .map_err(|source| QueryError::PageStateUnreadable { page, source })?;
        if programmed {
            residue.programmed_pages.push(page);
        }
    }

    for slot in OtpSlot::ALL {
        let programmed = otp
            .is_slot_programmed(slot)
            .map_err(|source| QueryError::SlotStateUnreadable { slot, source })?;
        if programmed {
            residue.programmed_slots.push(slot);
        }
    }

    if residue.is_blank() {
        info!("Secret storage blank");
    } else {
        warn!(
            pages = ?residue.programmed_pages,
            slots = ?residue.programmed_slots,
            complete = residue.is_complete(),
            "Secret storage holds residue from an earlier session"
        );
    }

    Ok(residue)
}
