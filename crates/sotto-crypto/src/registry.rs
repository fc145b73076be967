//! Durable key storage for one identity.

use std::{fs, path::PathBuf};

use crate::keys::{CryptoError, KeyPair};

/// File name of the stored private half.
const PRIVATE_KEY_FILE: &str = "private.pem";

/// File name of the stored public half.
const PUBLIC_KEY_FILE: &str = "public.pem";

/// Loads or creates the key pair for one identity at a directory.
///
/// Idempotent across restarts, keyed by the presence of stored material: if
/// the directory exists the pair is loaded from it, otherwise a fresh pair
/// is generated and persisted. Stored material that exists but cannot be
/// read or parsed is a fatal startup error for that identity; the registry
/// never silently regenerates over it.
#[derive(Debug, Clone)]
pub struct KeyRegistry {
    dir: PathBuf,
}

impl KeyRegistry {
    /// Registry rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage location of this registry.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Load the stored pair, or generate a `bits`-sized one and persist it.
    pub fn load_or_generate(&self, bits: usize) -> Result<KeyPair, CryptoError> {
        if self.dir.exists() {
            return self.load();
        }
        let pair = KeyPair::generate(bits)?;
        self.persist(&pair)?;
        Ok(pair)
    }

    fn load(&self) -> Result<KeyPair, CryptoError> {
        let pem = fs::read_to_string(self.dir.join(PRIVATE_KEY_FILE))?;
        KeyPair::from_private_pem(&pem)
    }

    fn persist(&self, pair: &KeyPair) -> Result<(), CryptoError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(PRIVATE_KEY_FILE), pair.private_pem()?)?;
        fs::write(self.dir.join(PUBLIC_KEY_FILE), pair.public_pem()?)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_same_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = KeyRegistry::new(tmp.path().join("keys"));

        let first = registry.load_or_generate(1024).unwrap();
        let second = registry.load_or_generate(1024).unwrap();

        // Same stored pair both times: what one half seals, the reload opens.
        let block = first.peer_key().encrypt(b"stable identity").unwrap();
        assert_eq!(second.decrypt(&block).unwrap(), b"stable identity");
        assert_eq!(first.public_pem().unwrap(), second.public_pem().unwrap());
    }

    #[test]
    fn persists_both_halves() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("keys");
        KeyRegistry::new(&dir).load_or_generate(1024).unwrap();

        assert!(dir.join("private.pem").exists());
        assert!(dir.join("public.pem").exists());
    }

    #[test]
    fn corrupt_stored_key_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("keys");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("private.pem"), "not a key").unwrap();

        let result = KeyRegistry::new(&dir).load_or_generate(1024);
        assert!(matches!(result, Err(CryptoError::Pem(_))));
    }

    #[test]
    fn missing_private_file_is_fatal_when_dir_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("keys");
        fs::create_dir_all(&dir).unwrap();

        let result = KeyRegistry::new(&dir).load_or_generate(1024);
        assert!(matches!(result, Err(CryptoError::Io(_))));
    }
}
