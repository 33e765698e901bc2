//! On-disk password store (`conf/password.conf`).

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::properties::{load_properties, store_properties};

/// Location of an instance's `password.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordStore {
    path: PathBuf,
}

impl PasswordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read every stored password. A missing file is an empty store.
    pub fn load(&self) -> io::Result<BTreeMap<String, String>> {
        let mut passwords = BTreeMap::new();
        if self.path.exists() {
            tracing::info!(path = %self.path.display(), "Loading password config");
            load_properties(&self.path, &mut passwords)?;
        }
        Ok(passwords)
    }

    /// Replace the stored passwords with `passwords`.
    pub fn store(&self, passwords: &BTreeMap<String, String>) -> io::Result<()> {
        tracing::info!(
            path = %self.path.display(),
            entries = passwords.len(),
            "Storing password config"
        );
        store_properties(&self.path, passwords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PasswordStore::new(dir.path().join("password.conf"));
        assert!(!store.exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PasswordStore::new(dir.path().join("password.conf"));

        let mut passwords = BTreeMap::new();
        passwords.insert("internal".to_string(), "Secret.123".to_string());
        store.store(&passwords).unwrap();

        assert_eq!(store.load().unwrap(), passwords);
    }
}
