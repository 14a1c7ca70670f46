//! Key lifecycle — persists the per-user *salt*, never the key.
//!
//! The encryption key is re-derived each session from the stored salt plus
//! a passphrase the caller supplies; see `dv_crypto::cipher::derive_key`.
//! Records are keyed by user id, so initializing keys for a second user on
//! a shared device does not invalidate the first user's salt.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StoreError;
use crate::models::KeyInfo;

const KEY_INFO_FILE: &str = "key_info.json";

/// File-backed salt registry in the local data directory.
#[derive(Debug, Clone)]
pub struct KeyManager {
    path: PathBuf,
}

impl KeyManager {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(KEY_INFO_FILE),
        }
    }

    /// Generate and persist a fresh salt for `user_id`, returning it.
    ///
    /// Calling this again for the same user overwrites the prior salt and
    /// silently invalidates any ciphertext derived from it — callers are
    /// responsible for only initializing once per user.
    pub fn initialize_user_keys(&self, user_id: &str) -> Result<String, StoreError> {
        let salt = dv_crypto::cipher::generate_salt();
        self.store_key_info(user_id, &salt)?;
        Ok(salt)
    }

    pub fn store_key_info(&self, user_id: &str, salt: &str) -> Result<(), StoreError> {
        if user_id.is_empty() || salt.is_empty() {
            return Err(StoreError::InvalidInput(
                "user id and salt must not be empty".into(),
            ));
        }
        let mut registry = self.load()?;
        registry.insert(
            user_id.to_owned(),
            KeyInfo {
                user_id: user_id.to_owned(),
                salt: salt.to_owned(),
                derived_at: Utc::now(),
            },
        );
        self.save(&registry)
    }

    /// Salt info for `user_id`, or `None` if this user has never
    /// initialized keys on this device.
    pub fn get_key_info(&self, user_id: &str) -> Result<Option<KeyInfo>, StoreError> {
        let registry = self.load()?;
        Ok(registry.get(user_id).cloned())
    }

    /// Logout: drop all persisted salt info. Subsequent lookups return
    /// `None` until re-initialized.
    pub fn clear_key_info(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self) -> Result<HashMap<String, KeyInfo>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, registry: &HashMap<String, KeyInfo>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(registry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_returns_persisted_salt() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let salt = keys.initialize_user_keys("u-1").unwrap();
        let info = keys.get_key_info("u-1").unwrap().unwrap();
        assert_eq!(info.salt, salt);
        assert_eq!(info.user_id, "u-1");
    }

    #[test]
    fn unknown_user_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        keys.store_key_info("u-b", "salt-b").unwrap();
        assert!(keys.get_key_info("u-a").unwrap().is_none());
    }

    #[test]
    fn second_user_does_not_clobber_first() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let salt_a = keys.initialize_user_keys("u-a").unwrap();
        let salt_b = keys.initialize_user_keys("u-b").unwrap();
        assert_ne!(salt_a, salt_b);
        assert_eq!(keys.get_key_info("u-a").unwrap().unwrap().salt, salt_a);
        assert_eq!(keys.get_key_info("u-b").unwrap().unwrap().salt, salt_b);
    }

    #[test]
    fn clear_forgets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        keys.initialize_user_keys("u-1").unwrap();
        keys.clear_key_info().unwrap();
        assert!(keys.get_key_info("u-1").unwrap().is_none());

        // Idempotent on an already-empty registry.
        keys.clear_key_info().unwrap();
    }

    #[test]
    fn reinitializing_overwrites_the_salt() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(dir.path());

        let first = keys.initialize_user_keys("u-1").unwrap();
        let second = keys.initialize_user_keys("u-1").unwrap();
        assert_ne!(first, second);
        assert_eq!(keys.get_key_info("u-1").unwrap().unwrap().salt, second);
    }
}
