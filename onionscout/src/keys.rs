//! Ed25519 key pairs in the expanded form Tor stores on disk.
//!
//! A key pair is produced from a 32-byte seed: the seed is hashed with
//! SHA-512, the lower half is clamped into a scalar, and the public key is
//! that scalar times the base point. Only the 64-byte expanded secret is ever
//! persisted; the seed is discarded.
use ed25519_dalek::hazmat::ExpandedSecretKey;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha512};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::address::{self, OnionAddress, PUBLIC_KEY_LEN};
use crate::errors::{VanityError, VanityResult};

pub const SEED_LEN: usize = 32;
pub const EXPANDED_SECRET_LEN: usize = 64;

/// An Ed25519 public key together with its expanded secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)]
    public: [u8; PUBLIC_KEY_LEN],
    secret: [u8; EXPANDED_SECRET_LEN],
}

impl KeyPair {
    /// Draws a fresh seed from `rng` and derives a key pair from it.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> VanityResult<Self> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rng.try_fill_bytes(&mut seed[..])
            .map_err(VanityError::key_generation)?;
        Ok(Self::from_seed(&seed))
    }

    /// Derives the key pair for a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        let digest = Sha512::digest(seed);
        let mut secret = [0u8; EXPANDED_SECRET_LEN];
        secret.copy_from_slice(&digest);
        clamp(&mut secret);
        Self::from_expanded(secret)
    }

    /// Rebuilds a key pair from a stored 64-byte expanded secret.
    pub fn from_expanded_bytes(bytes: &[u8]) -> VanityResult<Self> {
        let secret: [u8; EXPANDED_SECRET_LEN] = bytes.try_into().map_err(|_| {
            VanityError::invalid_key(format!(
                "expanded secret must be {} bytes, got {}",
                EXPANDED_SECRET_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::from_expanded(secret))
    }

    fn from_expanded(secret: [u8; EXPANDED_SECRET_LEN]) -> Self {
        let expanded = ExpandedSecretKey::from_bytes(&secret);
        let public = VerifyingKey::from(&expanded).to_bytes();
        Self { public, secret }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public
    }

    /// The raw expanded secret, as written to the output directory.
    pub fn secret_bytes(&self) -> &[u8; EXPANDED_SECRET_LEN] {
        &self.secret
    }

    pub fn address(&self) -> OnionAddress {
        address::encode(&self.public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address().as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn clamp(secret: &mut [u8; EXPANDED_SECRET_LEN]) {
    secret[0] &= 248;
    secret[31] &= 63;
    secret[31] |= 64;
}

/// Builds the random generator owned by one worker, seeded once from the OS
/// entropy pool.
pub fn worker_rng(worker: usize) -> VanityResult<ChaCha20Rng> {
    let rng = ChaCha20Rng::from_rng(OsRng).map_err(|e| {
        VanityError::key_generation(format!("seeding worker {} failed: {}", worker, e))
    })?;
    debug!("Worker {} seeded its generator", worker);
    Ok(rng)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8032, section 7.1, test 1
    const RFC8032_SEED: [u8; 32] = [
        0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60, 0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c,
        0xc4, 0x44, 0x49, 0xc5, 0x69, 0x7b, 0x32, 0x69, 0x19, 0x70, 0x3b, 0xac, 0x03, 0x1c, 0xae,
        0x7f, 0x60,
    ];
    const RFC8032_PUBLIC: [u8; 32] = [
        0xd7, 0x5a, 0x98, 0x01, 0x82, 0xb1, 0x0a, 0xb7, 0xd5, 0x4b, 0xfe, 0xd3, 0xc9, 0x64, 0x07,
        0x3a, 0x0e, 0xe1, 0x72, 0xf3, 0xda, 0xa6, 0x23, 0x25, 0xaf, 0x02, 0x1a, 0x68, 0xf7, 0x07,
        0x51, 0x1a,
    ];

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0)
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "entropy exhausted",
            )))
        }
    }

    impl CryptoRng for BrokenRng {}

    #[test]
    fn test_from_seed_matches_rfc8032() {
        let key_pair = KeyPair::from_seed(&RFC8032_SEED);
        assert_eq!(key_pair.public_key(), &RFC8032_PUBLIC);
        assert_eq!(
            key_pair.address().as_str(),
            "25njqamcweflpvkl73j4szahhihoc4xt3ktcgjnpaingr5yhkenl5sid"
        );
    }

    #[test]
    fn test_expanded_secret_is_clamped() {
        let key_pair = KeyPair::from_seed(&RFC8032_SEED);
        let secret = key_pair.secret_bytes();
        assert_eq!(secret[0] & 7, 0);
        assert_eq!(secret[31] & 0x80, 0);
        assert_eq!(secret[31] & 0x40, 0x40);
    }

    #[test]
    fn test_expanded_round_trip() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..16 {
            let key_pair = KeyPair::generate(&mut rng).unwrap();
            let reloaded = KeyPair::from_expanded_bytes(key_pair.secret_bytes()).unwrap();
            assert_eq!(reloaded.public_key(), key_pair.public_key());
            assert_eq!(reloaded.address(), key_pair.address());
        }
    }

    #[test]
    fn test_seeded_generators_are_reproducible() {
        let mut a = ChaCha20Rng::seed_from_u64(7);
        let mut b = ChaCha20Rng::seed_from_u64(7);
        let first = KeyPair::generate(&mut a).unwrap();
        let second = KeyPair::generate(&mut b).unwrap();
        assert_eq!(first.public_key(), second.public_key());

        let third = KeyPair::generate(&mut a).unwrap();
        assert_ne!(first.public_key(), third.public_key());
    }

    #[test]
    fn test_generate_reports_rng_failure() {
        let err = KeyPair::generate(&mut BrokenRng).unwrap_err();
        assert!(matches!(err, VanityError::KeyGenerationFailure(_)));
        assert!(err.to_string().contains("entropy exhausted"));
    }

    #[test]
    fn test_from_expanded_bytes_rejects_bad_length() {
        let err = KeyPair::from_expanded_bytes(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, VanityError::InvalidKey(_)));
    }

    #[test]
    fn test_worker_rngs_are_independent() {
        let mut first = worker_rng(0).unwrap();
        let mut second = worker_rng(1).unwrap();
        assert_ne!(first.next_u64(), second.next_u64());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key_pair = KeyPair::from_seed(&RFC8032_SEED);
        let rendered = format!("{:?}", key_pair);
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("25njqamc"));
    }
}
