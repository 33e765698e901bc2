//! Credential resolution subsystem.
//!
//! # Data Flow
//! ```text
//! resolve(name)
//!     → in-memory cache (seeded from password.conf by load())
//!     → secret service, key "<instance>/<name>"
//!     → interactive prompt (NonInteractive fails instead)
//!     → every hit is written back into the cache
//!
//! persist()
//!     → whole cache replaces password.conf
//! ```
//!
//! # Security Constraints
//! - Secrets never appear in logs or `Debug` output
//! - The secret service is consulted once per miss, never retried
//! - Nothing reaches disk unless `persist()` is called
//!
//! # Blocking
//! Resolution is synchronous: the keyring runs `keyctl` and the prompt
//! reads the terminal. The resolver is `Send + 'static`, so async callers
//! move it into `tokio::task::spawn_blocking` and take it back afterwards.

pub mod prompt;
pub mod resolver;
pub mod secret_service;
pub mod store;
pub mod token;

use thiserror::Error;

pub use prompt::{NonInteractive, PromptError, SecretPrompt, TerminalPrompt};
pub use resolver::CredentialResolver;
pub use secret_service::{KeyringSecretService, NoSecretService, SecretService, SecretServiceError};
pub use store::PasswordStore;
pub use token::{credential_name_for_token, normalize_token, INTERNAL_TOKEN_NAME};

/// Errors that can occur while resolving or persisting credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Cache, secret service and prompt all came up empty.
    #[error("Credential unavailable: {name}")]
    Unavailable { name: String },

    /// The interactive prompt itself failed.
    #[error("Unable to read password for {name}: {source}")]
    Prompt {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the on-disk password store failed.
    #[error("Password store error: {0}")]
    Store(#[from] std::io::Error),
}

pub type CredentialResult<T> = Result<T, CredentialError>;
