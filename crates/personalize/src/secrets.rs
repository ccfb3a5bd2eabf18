//! Secret material containers.
//!
//! Every container zeroizes on drop, is not `Clone`, and prints as
//! `[REDACTED]` so secrets cannot leak through logging.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::flash::SEED_SIZE;
use crate::otp::{RMA_TOKEN_SIZE, ROOT_KEY_SHARE_SIZE};

/// Derivation context for the stored RMA token digest.
pub const RMA_TOKEN_DIGEST_CONTEXT: &str = "manuf-personalize 2024-01 rma unlock token digest v1";

/// Fixed-width secret byte string.
pub struct SecretBytes<const N: usize>([u8; N]);

impl<const N: usize> SecretBytes<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub fn expose_secret(&self) -> &[u8; N] {
        &self.0
    }

    /// All-zero or all-ones values indicate a stuck random source.
    pub fn is_degenerate(&self) -> bool {
        self.0.iter().all(|b| *b == 0x00) || self.0.iter().all(|b| *b == 0xff)
    }
}

impl<const N: usize> Zeroize for SecretBytes<N> {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl<const N: usize> Drop for SecretBytes<N> {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl<const N: usize> ZeroizeOnDrop for SecretBytes<N> {}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{}>([REDACTED])", N)
    }
}

/// Key manager root seeds stored in flash info pages.
#[derive(Debug)]
pub struct SeedPair {
    pub creator_seed: SecretBytes<SEED_SIZE>,
    pub owner_seed: SecretBytes<SEED_SIZE>,
}

/// Creator root key, stored as two independently random shares.
#[derive(Debug)]
pub struct RootKey {
    pub share0: SecretBytes<ROOT_KEY_SHARE_SIZE>,
    pub share1: SecretBytes<ROOT_KEY_SHARE_SIZE>,
}

/// RMA unlock token.
#[derive(Debug)]
pub struct RmaToken(SecretBytes<RMA_TOKEN_SIZE>);

impl RmaToken {
    pub fn new(token: SecretBytes<RMA_TOKEN_SIZE>) -> Self {
        Self(token)
    }

    pub fn expose_secret(&self) -> &[u8; RMA_TOKEN_SIZE] {
        self.0.expose_secret()
    }

    /// One-way digest programmed into the OTP token slot. The lifecycle
    /// controller compares a presented token against this value.
    pub fn digest(&self) -> SecretBytes<RMA_TOKEN_SIZE> {
        let mut full = blake3::derive_key(RMA_TOKEN_DIGEST_CONTEXT, self.0.expose_secret());
        let mut digest = [0u8; RMA_TOKEN_SIZE];
        digest.copy_from_slice(&full[..RMA_TOKEN_SIZE]);
        full.zeroize();
        SecretBytes::new(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretBytes::new([0x5a; 32]);
        let printed = format!("{:?}", secret);
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("5a"));
        assert!(!printed.contains("90"));

        let token = RmaToken::new(SecretBytes::new([0x42; RMA_TOKEN_SIZE]));
        assert!(!format!("{:?}", token).contains("66"));
    }

    #[test]
    fn test_degenerate_detection() {
        assert!(SecretBytes::new([0u8; 16]).is_degenerate());
        assert!(SecretBytes::new([0xffu8; 16]).is_degenerate());

        let mut mixed = [0u8; 16];
        mixed[7] = 1;
        assert!(!SecretBytes::new(mixed).is_degenerate());
    }

    #[test]
    fn test_token_digest_differs_from_token() {
        let token = RmaToken::new(SecretBytes::new([7u8; RMA_TOKEN_SIZE]));
        let digest = token.digest();
        assert_ne!(digest.expose_secret(), token.expose_secret());
        // Deterministic
        assert_eq!(digest.expose_secret(), token.digest().expose_secret());
    }

    #[test]
    fn test_zeroize_clears_bytes() {
        let mut secret = SecretBytes::new([0xaa; 8]);
        secret.zeroize();
        assert_eq!(secret.expose_secret(), &[0u8; 8]);
    }
}
