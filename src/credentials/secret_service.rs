//! External secret service clients.

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

/// Operational failure talking to a secret service.
///
/// A key that simply does not exist is `Ok(None)`, not an error.
#[derive(Debug, Error)]
pub enum SecretServiceError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Secret for {key} is not valid UTF-8")]
    Encoding { key: String },
}

/// Durable key-value store for credentials.
///
/// Lookups are synchronous and may block on I/O or a child process.
pub trait SecretService {
    /// Look up `key`. `Ok(None)` means the service is reachable and has no such key.
    fn get(&self, key: &str) -> Result<Option<String>, SecretServiceError>;
}

/// A secret service that never has anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSecretService;

impl SecretService for NoSecretService {
    fn get(&self, _key: &str) -> Result<Option<String>, SecretServiceError> {
        Ok(None)
    }
}

/// Kernel keyring access through the `keyctl` utility.
///
/// Secrets live as `user` keys in the user keyring (`@u`), named
/// `<instance>/<credential>`. Each lookup waits on `keyctl`; async callers
/// run it through `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct KeyringSecretService {
    keyctl: PathBuf,
}

impl KeyringSecretService {
    pub fn new() -> Self {
        Self::with_command("keyctl")
    }

    /// Use a specific `keyctl` binary.
    pub fn with_command(keyctl: impl Into<PathBuf>) -> Self {
        Self {
            keyctl: keyctl.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, SecretServiceError> {
        tracing::debug!(command = %self.keyctl.display(), args = ?args, "Running keyctl");
        Command::new(&self.keyctl)
            .args(args)
            .output()
            .map_err(|source| SecretServiceError::Spawn {
                command: self.keyctl.display().to_string(),
                source,
            })
    }
}

impl Default for KeyringSecretService {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretService for KeyringSecretService {
    fn get(&self, key: &str) -> Result<Option<String>, SecretServiceError> {
        let search = self.run(&["search", "@u", "user", key])?;
        if !search.status.success() {
            // keyctl exits non-zero when the key does not exist.
            return Ok(None);
        }

        let key_id = String::from_utf8_lossy(&search.stdout).trim().to_string();
        let pipe = self.run(&["pipe", &key_id])?;
        if !pipe.status.success() {
            return Err(SecretServiceError::Command {
                command: format!("{} pipe {}", self.keyctl.display(), key_id),
                status: pipe.status.to_string(),
                stderr: String::from_utf8_lossy(&pipe.stderr).trim().to_string(),
            });
        }

        String::from_utf8(pipe.stdout)
            .map(Some)
            .map_err(|_| SecretServiceError::Encoding {
                key: key.to_string(),
            })
    }
}
