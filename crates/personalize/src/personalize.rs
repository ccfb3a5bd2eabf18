//! Top-level personalization session.
//!
//! Runs the gate, guard, generator, writer, locker, verifier and packager in
//! order against injected controller handles. Every failure is returned to
//! the caller; nothing is retried here.

use manuf_core::{Config, ResumePolicy};
use tracing::{error, info, warn};

use crate::ecc::{EccPrimitive, P256Primitive};
use crate::entropy::{EntropySource, OsEntropy};
use crate::error::{LockError, PreconditionError, ProvisioningError, QueryError};
use crate::export::{ExportBundle, ExportPackager, ExportStatus};
use crate::flash::FlashController;
use crate::gate::check_preconditions;
use crate::generator::SecretMaterialGenerator;
use crate::guard::{inspect_residue, is_already_provisioned};
use crate::lifecycle::LifecycleController;
use crate::lock::lock_secret_partition;
use crate::otp::OtpController;
use crate::state::{PersonalizationSession, SessionState};
use crate::verify::check_personalization_complete;
use crate::writer;

/// Personalization engine bound to a random source and an EC primitive.
pub struct Personalizer<E: EntropySource, C: EccPrimitive = P256Primitive> {
    entropy: E,
    ecc: C,
    resume_policy: ResumePolicy,
    host_public_key: Option<Vec<u8>>,
    format_version: u32,
    session: PersonalizationSession,
}

impl<E: EntropySource, C: EccPrimitive> Personalizer<E, C> {
    /// Build an engine from station configuration. The host public key, when
    /// configured, must be a point on the curve.
    pub fn new(entropy: E, ecc: C, config: &Config) -> Result<Self, ProvisioningError> {
        let host_public_key = config
            .personalization
            .host_public_key_bytes()
            .map_err(|e| PreconditionError::HostKeyRejected(e.to_string()))?;

        if let Some(key) = &host_public_key {
            ecc.validate_public_key(key)
                .map_err(|e| PreconditionError::HostKeyRejected(e.to_string()))?;
        }

        Ok(Self {
            entropy,
            ecc,
            resume_policy: config.personalization.resume_policy,
            host_public_key,
            format_version: config.export.format_version,
            session: PersonalizationSession::new(),
        })
    }

    /// State machine record of the most recent session.
    pub fn last_session(&self) -> &PersonalizationSession {
        &self.session
    }

    /// Run one personalization session.
    ///
    /// On success the caller must reset the device. On failure the error's
    /// [`disposition`](ProvisioningError::disposition) says whether the unit
    /// may be retried or must be quarantined.
    pub fn provision_device(
        &mut self,
        flash: &mut impl FlashController,
        lifecycle: &impl LifecycleController,
        otp: &mut impl OtpController,
    ) -> Result<ExportBundle, ProvisioningError> {
        self.session = PersonalizationSession::new();

        let result = self.run(flash, lifecycle, otp);
        match &result {
            Ok(bundle) => {
                info!(status = ?bundle.status, "Personalization session finished");
            }
            Err(e) => {
                error!(
                    error = %e,
                    disposition = ?e.disposition(),
                    writes_started = e.writes_started(),
                    "Personalization session failed"
                );
                self.session.fail(e.kind(), &e.to_string());
            }
        }
        result
    }

    fn run(
        &mut self,
        flash: &mut impl FlashController,
        lifecycle: &impl LifecycleController,
        otp: &mut impl OtpController,
    ) -> Result<ExportBundle, ProvisioningError> {
        let lifecycle_state = lifecycle.read_state().map_err(PreconditionError::from)?;
        check_preconditions(lifecycle_state, self.entropy.is_available())?;
        self.session
            .advance(SessionState::GateChecked, "preconditions satisfied")?;
        info!(lifecycle = %lifecycle_state, "Preconditions satisfied");

        let packager = ExportPackager::new(self.format_version, lifecycle_state);

        let partition_state = otp
            .secret_partition_state()
            .map_err(QueryError::PartitionStateUnreadable)?;
        if is_already_provisioned(partition_state) {
            info!("Secret partition already locked, nothing to do");
            self.session
                .advance(SessionState::ShortCircuitDone, "secret partition already locked")?;
            return Ok(packager.package_without_material(ExportStatus::AlreadyProvisioned));
        }

        let residue = inspect_residue(&*flash, &*otp)?;
        if !residue.is_blank() {
            if residue.is_complete() && self.resume_policy == ResumePolicy::LockOnly {
                warn!("Resuming interrupted session: re-issuing lock only");
                lock_and_verify(&mut self.session, otp)?;
                return finish(
                    &mut self.session,
                    packager.package_without_material(ExportStatus::Resumed),
                );
            }
            return Err(ProvisioningError::PartiallyProvisioned {
                programmed_pages: residue.programmed_pages,
                programmed_slots: residue.programmed_slots,
            });
        }

        let generator = SecretMaterialGenerator::new(&self.ecc, self.host_public_key.as_deref());
        let (seeds, root_key, rma_token, public) = generator.generate(&mut self.entropy)?;
        self.session
            .advance(SessionState::Generated, "secret material generated")?;

        writer::write_flash_seeds(flash, &seeds)?;
        self.session
            .advance(SessionState::FlashWritten, "seeds written to info pages")?;

        writer::write_otp_secrets(otp, &root_key, &rma_token)?;
        self.session
            .advance(SessionState::OtpWritten, "root key and token written")?;

        // Secrets are zeroized before the lock is issued
        drop(seeds);
        drop(root_key);
        drop(rma_token);

        lock_and_verify(&mut self.session, otp)?;
        finish(&mut self.session, packager.package_export(public))
    }
}

impl Personalizer<OsEntropy> {
    /// Engine using the operating system random source and P-256.
    pub fn with_defaults(config: &Config) -> Result<Self, ProvisioningError> {
        Self::new(OsEntropy, P256Primitive, config)
    }
}

fn lock_and_verify(
    session: &mut PersonalizationSession,
    otp: &mut impl OtpController,
) -> Result<(), ProvisioningError> {
    lock_secret_partition(otp)?;

    // Locked is only recorded once the partition reads back locked
    match check_personalization_complete(&*otp) {
        Ok(true) => {}
        Ok(false) => {
            error!("Lock accepted but secret partition still reads unlocked");
            return Err(LockError::LockNotObserved.into());
        }
        Err(e) => return Err(ProvisioningError::Verification(e)),
    }
    session.advance(SessionState::Locked, "partition reads locked")?;
    session.advance(SessionState::Verified, "lock read back")?;
    info!("Secret partition locked");
    Ok(())
}

fn finish(
    session: &mut PersonalizationSession,
    bundle: ExportBundle,
) -> Result<ExportBundle, ProvisioningError> {
    session.advance(SessionState::Exported, "export bundle assembled")?;
    session.advance(SessionState::Done, "session complete")?;
    Ok(bundle)
}

/// Run one session with an explicit random source and the P-256 primitive.
pub fn provision_device<E: EntropySource>(
    flash: &mut impl FlashController,
    lifecycle: &impl LifecycleController,
    otp: &mut impl OtpController,
    entropy: E,
    config: &Config,
) -> Result<ExportBundle, ProvisioningError> {
    Personalizer::new(entropy, P256Primitive, config)?.provision_device(flash, lifecycle, otp)
}
