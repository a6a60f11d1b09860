//! Version 3 onion service address codec.
//!
//! ```text
//! checksum = SHA3-256(".onion checksum" || pubkey || version)[..2]
//! address  = lowercase(base32(pubkey || checksum || version))
//! ```
//!
//! The 35 encoded bytes are a whole number of base32 blocks, so addresses are
//! always 56 characters with no padding.
use base32::Alphabet;
use sha3::{Digest, Sha3_256};
use std::fmt;

use crate::errors::{VanityError, VanityResult};
use crate::keys::KeyPair;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const CHECKSUM_LEN: usize = 2;
pub const VERSION: u8 = 0x03;
pub const ADDRESS_LEN: usize = 56;
pub const ONION_SUFFIX: &str = ".onion";

const CHECKSUM_PREFIX: &[u8] = b".onion checksum";
const DECODED_LEN: usize = PUBLIC_KEY_LEN + CHECKSUM_LEN + 1;
const BASE32: Alphabet = Alphabet::RFC4648 { padding: false };

/// A v3 onion address without the `.onion` suffix, always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OnionAddress(String);

impl OnionAddress {
    /// Parses and validates an address, accepting either case and an optional
    /// `.onion` suffix.
    pub fn parse(text: &str) -> VanityResult<Self> {
        let public_key = decode(text)?;
        Ok(encode(&public_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address with the `.onion` suffix, as a browser would want it.
    pub fn hostname(&self) -> String {
        format!("{}{}", self.0, ONION_SUFFIX)
    }

    /// Recovers the public key the address was derived from.
    pub fn public_key(&self) -> VanityResult<[u8; PUBLIC_KEY_LEN]> {
        decode(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for OnionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OnionAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// First two bytes of the address checksum for `public_key`.
pub fn checksum(public_key: &[u8; PUBLIC_KEY_LEN]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Sha3_256::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(public_key);
    hasher.update([VERSION]);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

/// Encodes an Ed25519 public key as an onion address.
pub fn encode(public_key: &[u8; PUBLIC_KEY_LEN]) -> OnionAddress {
    let mut bytes = [0u8; DECODED_LEN];
    bytes[..PUBLIC_KEY_LEN].copy_from_slice(public_key);
    bytes[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + CHECKSUM_LEN].copy_from_slice(&checksum(public_key));
    bytes[DECODED_LEN - 1] = VERSION;

    let mut address = base32::encode(BASE32, &bytes);
    address.make_ascii_lowercase();
    OnionAddress(address)
}

/// Drops a trailing `.onion` in any letter case.
pub fn strip_onion_suffix(text: &str) -> &str {
    text.len()
        .checked_sub(ONION_SUFFIX.len())
        .filter(|&split| {
            text.is_char_boundary(split) && text[split..].eq_ignore_ascii_case(ONION_SUFFIX)
        })
        .map_or(text, |split| &text[..split])
}

/// Decodes an onion address back to its public key, checking the version
/// byte and checksum.
pub fn decode(address: &str) -> VanityResult<[u8; PUBLIC_KEY_LEN]> {
    let trimmed = strip_onion_suffix(address);

    if trimmed.len() != ADDRESS_LEN {
        return Err(VanityError::invalid_address(format!(
            "expected {} characters, got {}",
            ADDRESS_LEN,
            trimmed.len()
        )));
    }

    let upper = trimmed.to_ascii_uppercase();
    let bytes = base32::decode(BASE32, &upper).ok_or_else(|| {
        VanityError::invalid_address(format!("{} is not valid base32", trimmed))
    })?;
    if bytes.len() != DECODED_LEN {
        return Err(VanityError::invalid_address(format!(
            "{} decodes to {} bytes",
            trimmed,
            bytes.len()
        )));
    }

    let version = bytes[DECODED_LEN - 1];
    if version != VERSION {
        return Err(VanityError::invalid_address(format!(
            "{} has version {}, expected {}",
            trimmed, version, VERSION
        )));
    }

    let mut public_key = [0u8; PUBLIC_KEY_LEN];
    public_key.copy_from_slice(&bytes[..PUBLIC_KEY_LEN]);
    if bytes[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + CHECKSUM_LEN] != checksum(&public_key) {
        return Err(VanityError::invalid_address(format!(
            "{} has a bad checksum",
            trimmed
        )));
    }

    Ok(public_key)
}

/// Re-derives the address from stored secret key bytes and compares it with
/// `expected`. Used to self-test persisted keys, never in the search loop.
pub fn validate(secret_bytes: &[u8], expected: &str) -> bool {
    match KeyPair::from_expanded_bytes(secret_bytes) {
        Ok(key_pair) => encode(key_pair.public_key()).as_str() == expected,
        Err(_) => false,
    }
}
