//! Secret material generator.
//!
//! Draws every secret independently from the random source. The only
//! derived values are the public half of the device key pair and the
//! wrapped RMA token, both of which are exportable.

use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::ecc::{EccError, EccPrimitive};
use crate::entropy::EntropySource;
use crate::error::GenerationError;
use crate::rma_wrap::{wrap_rma_token, WrappedRmaToken};
use crate::secrets::{RmaToken, RootKey, SecretBytes, SeedPair};

/// Non-secret artifacts produced alongside the secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicExportable {
    /// SEC1 compressed device public key
    pub device_public_key: Vec<u8>,
    pub wrapped_rma_token: Option<WrappedRmaToken>,
}

/// Produces the seeds, root key, RMA token and the public artifacts.
pub struct SecretMaterialGenerator<'a, C: EccPrimitive> {
    ecc: &'a C,
    host_public_key: Option<&'a [u8]>,
}

impl<'a, C: EccPrimitive> SecretMaterialGenerator<'a, C> {
    pub fn new(ecc: &'a C, host_public_key: Option<&'a [u8]>) -> Self {
        Self {
            ecc,
            host_public_key,
        }
    }

    /// Generate all material. Pure computation plus random source draws;
    /// nothing is written anywhere.
    pub fn generate(
        &self,
        entropy: &mut dyn EntropySource,
    ) -> Result<(SeedPair, RootKey, RmaToken, PublicExportable), GenerationError> {
        let seeds = SeedPair {
            creator_seed: draw(entropy, "creator seed")?,
            owner_seed: draw(entropy, "owner seed")?,
        };
        let root_key = RootKey {
            share0: draw(entropy, "root key share 0")?,
            share1: draw(entropy, "root key share 1")?,
        };
        let rma_token = RmaToken::new(draw(entropy, "rma token")?);

        let device_keypair = self
            .ecc
            .generate_keypair(entropy)
            .map_err(|e| match e {
                EccError::Entropy(source) => GenerationError::EntropyExhausted {
                    what: "device key pair",
                    source,
                },
                other => GenerationError::KeyDerivationFailure(other),
            })?;

        let wrapped_rma_token = match self.host_public_key {
            Some(host_public_key) => Some(wrap_rma_token(
                self.ecc,
                &device_keypair,
                host_public_key,
                &rma_token,
                entropy,
            )?),
            None => {
                warn!("No host public key configured; RMA token will not be exported");
                None
            }
        };

        let public = PublicExportable {
            device_public_key: device_keypair.public_key().to_vec(),
            wrapped_rma_token,
        };
        // Device private key zeroized here
        drop(device_keypair);

        debug!(
            wrapped = public.wrapped_rma_token.is_some(),
            "Secret material generated"
        );
        Ok((seeds, root_key, rma_token, public))
    }
}

fn draw<const N: usize>(
    entropy: &mut dyn EntropySource,
    what: &'static str,
) -> Result<SecretBytes<N>, GenerationError> {
    let mut buf = [0u8; N];
    if let Err(source) = entropy.fill_bytes(&mut buf) {
        buf.zeroize();
        return Err(GenerationError::EntropyExhausted { what, source });
    }
    let secret = SecretBytes::new(buf);
    buf.zeroize();

    if secret.is_degenerate() {
        return Err(GenerationError::DegenerateEntropy { what });
    }
    Ok(secret)
}
