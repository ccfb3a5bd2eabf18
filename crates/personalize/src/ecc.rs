//! Elliptic-curve primitive boundary and its P-256 implementation.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use thiserror::Error;
use zeroize::Zeroize;

use crate::entropy::{EntropyError, EntropySource};
use crate::secrets::SecretBytes;

/// Size of a P-256 scalar and of the ECDH shared secret.
pub const EC_SCALAR_SIZE: usize = 32;

/// Elliptic-curve primitive failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EccError {
    #[error("entropy for key generation unavailable: {0}")]
    Entropy(#[from] EntropyError),

    #[error("drawn scalar is not a valid private key")]
    InvalidScalar,

    #[error("peer public key is not a valid curve point")]
    InvalidPublicKey,
}

/// Key pair held by the device (or by host tooling). The private half is
/// secret; the public half (SEC1 compressed) is exportable.
#[derive(Debug)]
pub struct EcKeyPair {
    private: SecretBytes<EC_SCALAR_SIZE>,
    public: Vec<u8>,
}

impl EcKeyPair {
    pub fn new(private: SecretBytes<EC_SCALAR_SIZE>, public: Vec<u8>) -> Self {
        Self { private, public }
    }

    pub fn private_key(&self) -> &SecretBytes<EC_SCALAR_SIZE> {
        &self.private
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }
}

/// Key generation and key agreement.
pub trait EccPrimitive {
    fn generate_keypair(&self, entropy: &mut dyn EntropySource) -> Result<EcKeyPair, EccError>;

    /// Check that `public_key` is a SEC1 encoded point on the curve.
    fn validate_public_key(&self, public_key: &[u8]) -> Result<(), EccError>;

    /// ECDH between the device private key and a peer's SEC1 public key.
    fn shared_secret(
        &self,
        keypair: &EcKeyPair,
        peer_public_key: &[u8],
    ) -> Result<SecretBytes<EC_SCALAR_SIZE>, EccError>;
}

/// NIST P-256 via the `p256` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Primitive;

impl EccPrimitive for P256Primitive {
    fn generate_keypair(&self, entropy: &mut dyn EntropySource) -> Result<EcKeyPair, EccError> {
        let mut drawn = [0u8; EC_SCALAR_SIZE];
        if let Err(e) = entropy.fill_bytes(&mut drawn) {
            drawn.zeroize();
            return Err(e.into());
        }
        let scalar = SecretBytes::new(drawn);
        drawn.zeroize();

        // Zero or >= n is rejected rather than reduced
        let secret_key =
            SecretKey::from_slice(scalar.expose_secret()).map_err(|_| EccError::InvalidScalar)?;
        let public = secret_key.public_key().to_encoded_point(true).as_bytes().to_vec();

        Ok(EcKeyPair::new(scalar, public))
    }

    fn validate_public_key(&self, public_key: &[u8]) -> Result<(), EccError> {
        PublicKey::from_sec1_bytes(public_key)
            .map(|_| ())
            .map_err(|_| EccError::InvalidPublicKey)
    }

    fn shared_secret(
        &self,
        keypair: &EcKeyPair,
        peer_public_key: &[u8],
    ) -> Result<SecretBytes<EC_SCALAR_SIZE>, EccError> {
        let peer =
            PublicKey::from_sec1_bytes(peer_public_key).map_err(|_| EccError::InvalidPublicKey)?;
        let secret_key = SecretKey::from_slice(keypair.private_key().expose_secret())
            .map_err(|_| EccError::InvalidScalar)?;

        let shared = p256::ecdh::diffie_hellman(secret_key.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; EC_SCALAR_SIZE];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(SecretBytes::new(out))
    }
}
