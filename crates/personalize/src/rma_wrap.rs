//! RMA unlock token wrapping for export to the manufacturing HSM.
//!
//! The token is sealed with ChaCha20-Poly1305 under a key derived from the
//! ECDH shared secret between the device key pair and the host public key.
//! The device public key is bound as associated data, so a wrapped token
//! only opens against the bundle it was exported in.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::ecc::{EcKeyPair, EccError, EccPrimitive};
use crate::entropy::EntropySource;
use crate::error::GenerationError;
use crate::otp::RMA_TOKEN_SIZE;
use crate::secrets::{RmaToken, SecretBytes};

/// Derivation context for the token wrapping key.
pub const WRAP_KEY_CONTEXT: &str = "manuf-personalize 2024-01 rma token wrap key v1";

pub const WRAP_NONCE_SIZE: usize = 12;

/// Truncated BLAKE3 of the host public key, identifying the unwrap key.
pub const HOST_KEY_ID_SIZE: usize = 8;

/// RMA token sealed to the host public key. Hex encoded fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedRmaToken {
    pub host_key_id: String,
    pub nonce: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnwrapError {
    #[error("wrapped token field is not valid hex: {0}")]
    Encoding(String),

    #[error("wrapped for host key {expected}, not {actual}")]
    WrongHostKey { expected: String, actual: String },

    #[error("key agreement failed: {0}")]
    KeyAgreement(#[from] EccError),

    #[error("wrapped token failed authentication")]
    Authentication,
}

pub fn host_key_id(host_public_key: &[u8]) -> String {
    hex::encode(&blake3::hash(host_public_key).as_bytes()[..HOST_KEY_ID_SIZE])
}

fn wrap_cipher(shared: &SecretBytes<32>) -> ChaCha20Poly1305 {
    let key = SecretBytes::new(blake3::derive_key(WRAP_KEY_CONTEXT, shared.expose_secret()));
    ChaCha20Poly1305::new(Key::from_slice(key.expose_secret()))
}

/// Seal `token` to `host_public_key` using the device key pair.
pub fn wrap_rma_token(
    ecc: &impl EccPrimitive,
    device_keypair: &EcKeyPair,
    host_public_key: &[u8],
    token: &RmaToken,
    entropy: &mut dyn EntropySource,
) -> Result<WrappedRmaToken, GenerationError> {
    let mut nonce = [0u8; WRAP_NONCE_SIZE];
    entropy
        .fill_bytes(&mut nonce)
        .map_err(|source| GenerationError::EntropyExhausted {
            what: "token wrap nonce",
            source,
        })?;

    let shared = ecc
        .shared_secret(device_keypair, host_public_key)
        .map_err(GenerationError::KeyDerivationFailure)?;
    let cipher = wrap_cipher(&shared);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: token.expose_secret(),
                aad: device_keypair.public_key(),
            },
        )
        .map_err(|e| GenerationError::TokenWrapFailure(e.to_string()))?;

    Ok(WrappedRmaToken {
        host_key_id: host_key_id(host_public_key),
        nonce: hex::encode(nonce),
        ciphertext: hex::encode(ciphertext),
    })
}

/// Host-side recovery of a wrapped token, as done by HSM tooling.
pub fn unwrap_rma_token(
    ecc: &impl EccPrimitive,
    host_keypair: &EcKeyPair,
    device_public_key: &[u8],
    wrapped: &WrappedRmaToken,
) -> Result<RmaToken, UnwrapError> {
    let ours = host_key_id(host_keypair.public_key());
    if wrapped.host_key_id != ours {
        return Err(UnwrapError::WrongHostKey {
            expected: wrapped.host_key_id.clone(),
            actual: ours,
        });
    }

    let nonce = hex::decode(&wrapped.nonce).map_err(|e| UnwrapError::Encoding(e.to_string()))?;
    if nonce.len() != WRAP_NONCE_SIZE {
        return Err(UnwrapError::Encoding(format!(
            "nonce is {} bytes, expected {}",
            nonce.len(),
            WRAP_NONCE_SIZE
        )));
    }
    let ciphertext =
        hex::decode(&wrapped.ciphertext).map_err(|e| UnwrapError::Encoding(e.to_string()))?;

    let shared = ecc.shared_secret(host_keypair, device_public_key)?;
    let mut plaintext = wrap_cipher(&shared)
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: device_public_key,
            },
        )
        .map_err(|_| UnwrapError::Authentication)?;

    if plaintext.len() != RMA_TOKEN_SIZE {
        plaintext.zeroize();
        return Err(UnwrapError::Authentication);
    }
    let mut token = [0u8; RMA_TOKEN_SIZE];
    token.copy_from_slice(&plaintext);
    plaintext.zeroize();

    let unwrapped = RmaToken::new(SecretBytes::new(token));
    token.zeroize();
    Ok(unwrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecc::P256Primitive;
    use crate::entropy::OsEntropy;

    fn token() -> RmaToken {
        RmaToken::new(SecretBytes::new(*b"rma-token-16byte"))
    }

    #[test]
    fn test_host_recovers_token() {
        let device = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
        let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();

        let wrapped =
            wrap_rma_token(&P256Primitive, &device, host.public_key(), &token(), &mut OsEntropy)
                .unwrap();
        assert_eq!(wrapped.host_key_id, host_key_id(host.public_key()));
        let ciphertext = hex::decode(&wrapped.ciphertext).unwrap();
        assert_ne!(&ciphertext[..RMA_TOKEN_SIZE], &token().expose_secret()[..]);

        let recovered =
            unwrap_rma_token(&P256Primitive, &host, device.public_key(), &wrapped).unwrap();
        assert_eq!(recovered.expose_secret(), token().expose_secret());
    }

    #[test]
    fn test_wrong_host_rejected() {
        let device = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
        let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
        let other = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();

        let wrapped =
            wrap_rma_token(&P256Primitive, &device, host.public_key(), &token(), &mut OsEntropy)
                .unwrap();
        let err = unwrap_rma_token(&P256Primitive, &other, device.public_key(), &wrapped)
            .unwrap_err();
        assert!(matches!(err, UnwrapError::WrongHostKey { .. }));
    }

    #[test]
    fn test_bound_to_device_public_key() {
        let device = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
        let impostor = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
        let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();

        let wrapped =
            wrap_rma_token(&P256Primitive, &device, host.public_key(), &token(), &mut OsEntropy)
                .unwrap();
        let err = unwrap_rma_token(&P256Primitive, &host, impostor.public_key(), &wrapped)
            .unwrap_err();
        assert_eq!(err, UnwrapError::Authentication);
    }

    #[test]
    fn test_invalid_host_key_is_derivation_failure() {
        let device = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
        let err = wrap_rma_token(&P256Primitive, &device, &[0x05; 33], &token(), &mut OsEntropy)
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::KeyDerivationFailure(EccError::InvalidPublicKey)
        );
    }
}
