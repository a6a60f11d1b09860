//! Saving matched keys to the output directory.
//!
//! Each match is written to `<output>/<address>` containing the raw 64-byte
//! expanded secret key. Optionally a Tor hidden service directory
//! `<output>/<address>.onion/` is written alongside it, ready to be pointed
//! at by `HiddenServiceDir`.
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::address::{strip_onion_suffix, OnionAddress};
use crate::errors::{VanityError, VanityResult};
use crate::keys::{KeyPair, EXPANDED_SECRET_LEN};

pub const SECRET_KEY_FILE: &str = "hs_ed25519_secret_key";
pub const PUBLIC_KEY_FILE: &str = "hs_ed25519_public_key";
pub const HOSTNAME_FILE: &str = "hostname";

const SECRET_KEY_HEADER: &[u8; 32] = b"== ed25519v1-secret: type0 ==\0\0\0";
const PUBLIC_KEY_HEADER: &[u8; 32] = b"== ed25519v1-public: type0 ==\0\0\0";

/// A key pair whose address matched, on its way to disk
#[derive(Debug)]
pub struct MatchRecord {
    pub address: OnionAddress,
    pub key_pair: KeyPair,
    /// Approximate global attempt number at which the key was found
    pub attempt_index: u64,
    pub worker: usize,
}

/// What is left of a match once its key is on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedMatch {
    pub address: String,
    pub path: PathBuf,
    pub attempt_index: u64,
    pub worker: usize,
}

/// Creates the output directory if needed. Safe to call from many workers at
/// once: a directory that already exists is not an error.
pub fn ensure_output_dir(dir: &Path) -> VanityResult<()> {
    fs::create_dir_all(dir).map_err(|e| VanityError::output_directory(dir, e))?;
    debug!("Output directory ready: {}", dir.display());
    Ok(())
}

/// Writes the matched secret key to `<dir>/<address>` and returns where it
/// went. The directory is created first if it is missing, so concurrent
/// callers may race on a fresh directory. If anything fails the address is
/// logged before the error is returned, so the match is never lost silently.
pub fn persist(record: &MatchRecord, dir: &Path) -> VanityResult<SavedMatch> {
    let path = dir.join(record.address.as_str());

    let written = fs::create_dir_all(dir)
        .and_then(|()| write_secret(&path, record.key_pair.secret_bytes()));
    if let Err(e) = written {
        error!(
            "Found {} after {} attempts but could not save it to {}: {}",
            record.address,
            record.attempt_index,
            path.display(),
            e
        );
        return Err(VanityError::persistence(
            record.address.as_str(),
            path,
            e,
        ));
    }

    info!("Saved key for {} to {}", record.address, path.display());
    Ok(SavedMatch {
        address: record.address.to_string(),
        path,
        attempt_index: record.attempt_index,
        worker: record.worker,
    })
}

/// Writes a Tor hidden service directory for the match:
/// `hs_ed25519_secret_key`, `hs_ed25519_public_key` and `hostname`.
pub fn persist_service_dir(record: &MatchRecord, dir: &Path) -> VanityResult<PathBuf> {
    let service_dir = dir.join(record.address.hostname());
    let address = record.address.as_str();
    let wrap = |path: PathBuf, e: std::io::Error| {
        error!(
            "Could not write service directory for {} at {}: {}",
            address,
            path.display(),
            e
        );
        VanityError::persistence(address, path, e)
    };

    // Also creates `dir` when it has gone missing
    fs::create_dir_all(&service_dir).map_err(|e| wrap(service_dir.clone(), e))?;

    let mut secret = Vec::with_capacity(SECRET_KEY_HEADER.len() + EXPANDED_SECRET_LEN);
    secret.extend_from_slice(SECRET_KEY_HEADER);
    secret.extend_from_slice(record.key_pair.secret_bytes());
    let secret_path = service_dir.join(SECRET_KEY_FILE);
    write_secret(&secret_path, &secret).map_err(|e| wrap(secret_path, e))?;

    let mut public = Vec::with_capacity(PUBLIC_KEY_HEADER.len() + 32);
    public.extend_from_slice(PUBLIC_KEY_HEADER);
    public.extend_from_slice(record.key_pair.public_key());
    let public_path = service_dir.join(PUBLIC_KEY_FILE);
    fs::write(&public_path, &public).map_err(|e| wrap(public_path, e))?;

    let hostname_path = service_dir.join(HOSTNAME_FILE);
    fs::write(&hostname_path, format!("{}\n", record.address.hostname()))
        .map_err(|e| wrap(hostname_path, e))?;

    debug!("Wrote service directory {}", service_dir.display());
    Ok(service_dir)
}

/// Loads a stored key. Accepts a raw expanded secret, a Tor
/// `hs_ed25519_secret_key` file, or a service directory containing one.
pub fn load_key(path: &Path) -> VanityResult<KeyPair> {
    let file = if path.is_dir() {
        path.join(SECRET_KEY_FILE)
    } else {
        path.to_path_buf()
    };
    let bytes = fs::read(&file).map_err(|e| {
        VanityError::invalid_key(format!("cannot read {}: {}", file.display(), e))
    })?;

    let secret = match bytes.strip_prefix(SECRET_KEY_HEADER.as_slice()) {
        Some(rest) => rest,
        None => bytes.as_slice(),
    };
    KeyPair::from_expanded_bytes(secret)
        .map_err(|e| VanityError::invalid_key(format!("{}: {}", file.display(), e)))
}

/// Reloads a stored key, re-derives its address and checks that it is the
/// name the key was stored under.
pub fn verify_key_file(path: &Path) -> VanityResult<OnionAddress> {
    let key_pair = load_key(path)?;
    let derived = key_pair.address();

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VanityError::invalid_key(format!("{} has no file name", path.display())))?;
    let expected = strip_onion_suffix(name);

    if derived.as_str() != expected {
        return Err(VanityError::invalid_key(format!(
            "{} holds the key for {}, not {}",
            path.display(),
            derived,
            expected
        )));
    }
    Ok(derived)
}

fn write_secret(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
