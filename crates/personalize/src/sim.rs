//! In-memory device model used by the `personalize-sim` tool and the tests.
//!
//! Flash pages and OTP slots are [`WriteOnceRegion`]s, so the simulated
//! controllers enforce the same one-shot rules as silicon. Each controller
//! can be told to fail specific operations to exercise the recovery paths.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::entropy::{EntropyError, EntropySource};
use crate::flash::{FlashController, FlashError, InfoPage, SEED_SIZE};
use crate::lifecycle::{LifecycleController, LifecycleError, LifecycleState};
use crate::otp::{OtpController, OtpError, OtpSlot, SecretPartitionState};
use crate::write_once::{WriteOnceError, WriteOnceRegion};

/// Simulated flash controller with the two seed info pages.
#[derive(Debug, Clone)]
pub struct SimFlash {
    pages: HashMap<InfoPage, WriteOnceRegion>,
    failing_pages: Vec<InfoPage>,
    fail_queries: bool,
    write_count: usize,
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFlash {
    pub fn new() -> Self {
        Self {
            pages: InfoPage::ALL
                .iter()
                .map(|page| (*page, WriteOnceRegion::new(SEED_SIZE)))
                .collect(),
            failing_pages: Vec::new(),
            fail_queries: false,
            write_count: 0,
        }
    }

    /// Make every write to `page` fail with a controller fault.
    pub fn fail_writes_to(&mut self, page: InfoPage) {
        self.failing_pages.push(page);
    }

    /// Make programmed-state queries fail.
    pub fn fail_state_queries(&mut self, fail: bool) {
        self.fail_queries = fail;
    }

    /// Number of accepted page writes.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn page_contents(&self, page: InfoPage) -> Option<&[u8]> {
        self.pages.get(&page).and_then(WriteOnceRegion::contents)
    }
}

impl FlashController for SimFlash {
    fn write_info_page(&mut self, page: InfoPage, data: &[u8]) -> Result<(), FlashError> {
        if self.failing_pages.contains(&page) {
            return Err(FlashError::Controller(format!("program error on {}", page)));
        }
        let region = self
            .pages
            .get_mut(&page)
            .ok_or_else(|| FlashError::Controller(format!("no region for {}", page)))?;

        region.program(data).map_err(|e| match e {
            WriteOnceError::AlreadyProgrammed => FlashError::PageAlreadyProgrammed(page),
            WriteOnceError::LengthMismatch { expected, actual } => FlashError::LengthMismatch {
                page,
                expected,
                actual,
            },
        })?;
        self.write_count += 1;
        debug!(%page, "Simulated flash page programmed");
        Ok(())
    }

    fn is_info_page_programmed(&self, page: InfoPage) -> Result<bool, FlashError> {
        if self.fail_queries {
            return Err(FlashError::Controller("info page status read failed".to_string()));
        }
        Ok(self
            .pages
            .get(&page)
            .map(WriteOnceRegion::is_programmed)
            .unwrap_or(false))
    }
}

/// Simulated OTP controller holding the secret partition.
#[derive(Debug, Clone)]
pub struct SimOtp {
    slots: HashMap<OtpSlot, WriteOnceRegion>,
    state: SecretPartitionState,
    failing_slots: Vec<OtpSlot>,
    failing_locks: usize,
    ignore_locks: bool,
    fail_queries: bool,
    fail_queries_after_lock: bool,
    lock_accepted: bool,
    write_count: usize,
    lock_count: usize,
}

impl Default for SimOtp {
    fn default() -> Self {
        Self::new()
    }
}

impl SimOtp {
    /// Blank, unlocked partition.
    pub fn new() -> Self {
        Self {
            slots: OtpSlot::ALL
                .iter()
                .map(|slot| (*slot, WriteOnceRegion::new(slot.size())))
                .collect(),
            state: SecretPartitionState::Unlocked,
            failing_slots: Vec::new(),
            failing_locks: 0,
            ignore_locks: false,
            fail_queries: false,
            fail_queries_after_lock: false,
            lock_accepted: false,
            write_count: 0,
            lock_count: 0,
        }
    }

    /// Partition locked at the factory by an earlier session.
    pub fn locked() -> Self {
        Self {
            state: SecretPartitionState::Locked,
            ..Self::new()
        }
    }

    /// Make every write to `slot` fail with a controller fault.
    pub fn fail_writes_to(&mut self, slot: OtpSlot) {
        self.failing_slots.push(slot);
    }

    /// Reject the next `count` lock commands.
    pub fn fail_next_locks(&mut self, count: usize) {
        self.failing_locks = count;
    }

    /// Accept lock commands without them taking effect.
    pub fn ignore_locks(&mut self, ignore: bool) {
        self.ignore_locks = ignore;
    }

    /// Make partition and slot state queries fail.
    pub fn fail_state_queries(&mut self, fail: bool) {
        self.fail_queries = fail;
    }

    /// Make partition state queries fail once a lock command was accepted.
    pub fn fail_state_queries_after_lock(&mut self, fail: bool) {
        self.fail_queries_after_lock = fail;
    }

    /// Number of accepted slot writes.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Number of lock commands received, accepted or not.
    pub fn lock_count(&self) -> usize {
        self.lock_count
    }

    /// Raw slot contents, visible to the test harness even when locked.
    pub fn slot_contents(&self, slot: OtpSlot) -> Option<&[u8]> {
        self.slots.get(&slot).and_then(WriteOnceRegion::contents)
    }
}

impl OtpController for SimOtp {
    fn write_secret(&mut self, slot: OtpSlot, data: &[u8]) -> Result<(), OtpError> {
        if self.state == SecretPartitionState::Locked {
            return Err(OtpError::PartitionLocked);
        }
        if self.failing_slots.contains(&slot) {
            return Err(OtpError::Controller(format!("program error on {}", slot)));
        }
        let region = self
            .slots
            .get_mut(&slot)
            .ok_or_else(|| OtpError::Controller(format!("no region for {}", slot)))?;

        region.program(data).map_err(|e| match e {
            WriteOnceError::AlreadyProgrammed => OtpError::SlotAlreadyProgrammed(slot),
            WriteOnceError::LengthMismatch { expected, actual } => OtpError::LengthMismatch {
                slot,
                expected,
                actual,
            },
        })?;
        self.write_count += 1;
        debug!(%slot, "Simulated OTP slot programmed");
        Ok(())
    }

    fn is_slot_programmed(&self, slot: OtpSlot) -> Result<bool, OtpError> {
        if self.fail_queries {
            return Err(OtpError::Controller("slot status read failed".to_string()));
        }
        if self.state == SecretPartitionState::Locked {
            return Err(OtpError::PartitionLocked);
        }
        Ok(self
            .slots
            .get(&slot)
            .map(WriteOnceRegion::is_programmed)
            .unwrap_or(false))
    }

    fn secret_partition_state(&self) -> Result<SecretPartitionState, OtpError> {
        if self.fail_queries {
            return Err(OtpError::Controller("partition status read failed".to_string()));
        }
        if self.fail_queries_after_lock && self.lock_accepted {
            return Err(OtpError::Controller(
                "partition status read failed after lock".to_string(),
            ));
        }
        Ok(self.state)
    }

    fn lock_secret_partition(&mut self) -> Result<(), OtpError> {
        self.lock_count += 1;
        if self.failing_locks > 0 {
            self.failing_locks -= 1;
            return Err(OtpError::Controller("lock command timed out".to_string()));
        }
        self.lock_accepted = true;
        if !self.ignore_locks {
            self.state = SecretPartitionState::Locked;
        }
        debug!(lock_count = self.lock_count, "Simulated OTP lock command");
        Ok(())
    }
}

/// Simulated lifecycle controller.
#[derive(Debug, Clone)]
pub struct SimLifecycle {
    state: LifecycleState,
    fail_reads: bool,
}

impl SimLifecycle {
    pub fn new(state: LifecycleState) -> Self {
        Self {
            state,
            fail_reads: false,
        }
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }
}

impl LifecycleController for SimLifecycle {
    fn read_state(&self) -> Result<LifecycleState, LifecycleError> {
        if self.fail_reads {
            return Err(LifecycleError::ReadFailed("lifecycle bus error".to_string()));
        }
        Ok(self.state)
    }
}

/// Deterministic random source for reproducible runs.
///
/// A byte budget models a generator that stops delivering mid-session.
#[derive(Debug, Clone)]
pub struct SimEntropy {
    rng: StdRng,
    available: bool,
    budget: Option<usize>,
    stuck_at: Option<u8>,
}

impl SimEntropy {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            available: true,
            budget: None,
            stuck_at: None,
        }
    }

    /// Random source without software access.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::seeded(0)
        }
    }

    /// Deliver at most `bytes` bytes in total.
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget = Some(bytes);
        self
    }

    /// Return `value` for every byte.
    pub fn stuck_at(mut self, value: u8) -> Self {
        self.stuck_at = Some(value);
        self
    }
}

impl EntropySource for SimEntropy {
    fn is_available(&self) -> bool {
        self.available
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        if !self.available {
            return Err(EntropyError::Unavailable);
        }
        if let Some(budget) = self.budget.as_mut() {
            if dest.len() > *budget {
                return Err(EntropyError::Exhausted {
                    requested: dest.len(),
                });
            }
            *budget -= dest.len();
        }
        match self.stuck_at {
            Some(value) => dest.fill(value),
            None => self.rng.fill_bytes(dest),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_rejects_writes_after_lock() {
        let mut otp = SimOtp::new();
        otp.lock_secret_partition().unwrap();
        assert_eq!(
            otp.write_secret(OtpSlot::RmaToken, &[1; 16]),
            Err(OtpError::PartitionLocked)
        );
        assert_eq!(otp.write_count(), 0);
    }

    #[test]
    fn test_otp_ignored_lock_stays_unlocked() {
        let mut otp = SimOtp::new();
        otp.ignore_locks(true);
        otp.lock_secret_partition().unwrap();
        assert_eq!(otp.lock_count(), 1);
        assert_eq!(
            otp.secret_partition_state().unwrap(),
            SecretPartitionState::Unlocked
        );
    }

    #[test]
    fn test_otp_state_unreadable_after_lock() {
        let mut otp = SimOtp::new();
        otp.fail_state_queries_after_lock(true);
        assert_eq!(
            otp.secret_partition_state().unwrap(),
            SecretPartitionState::Unlocked
        );

        otp.lock_secret_partition().unwrap();
        assert!(matches!(
            otp.secret_partition_state(),
            Err(OtpError::Controller(_))
        ));
    }

    #[test]
    fn test_flash_length_checked() {
        let mut flash = SimFlash::new();
        assert_eq!(
            flash.write_info_page(InfoPage::CreatorSecret, &[0; 16]),
            Err(FlashError::LengthMismatch {
                page: InfoPage::CreatorSecret,
                expected: SEED_SIZE,
                actual: 16
            })
        );
        assert_eq!(flash.is_info_page_programmed(InfoPage::CreatorSecret), Ok(false));
    }

    #[test]
    fn test_entropy_is_reproducible() {
        let mut a = SimEntropy::seeded(7);
        let mut b = SimEntropy::seeded(7);
        let (mut x, mut y) = ([0u8; 32], [0u8; 32]);
        a.fill_bytes(&mut x).unwrap();
        b.fill_bytes(&mut y).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn test_entropy_budget() {
        let mut entropy = SimEntropy::seeded(1).with_budget(40);
        let mut buf = [0u8; 32];
        entropy.fill_bytes(&mut buf).unwrap();
        assert_eq!(
            entropy.fill_bytes(&mut buf),
            Err(EntropyError::Exhausted { requested: 32 })
        );
    }
}
