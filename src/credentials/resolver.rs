//! Layered credential lookup with write-through caching.

use std::collections::BTreeMap;
use std::fmt;

use crate::credentials::prompt::{NonInteractive, PromptError, SecretPrompt};
use crate::credentials::secret_service::{NoSecretService, SecretService};
use crate::credentials::store::PasswordStore;
use crate::credentials::token::credential_name_for_token;
use crate::credentials::{CredentialError, CredentialResult};
use crate::observability::metrics;

/// Per-instance credential cache backed by a password store, a secret
/// service and a prompt.
pub struct CredentialResolver {
    instance: String,
    cache: BTreeMap<String, String>,
    store: PasswordStore,
    secrets: Box<dyn SecretService + Send + Sync>,
    prompt: Box<dyn SecretPrompt + Send + Sync>,
}

impl CredentialResolver {
    /// Empty resolver with no secret service and a failing prompt.
    pub fn new(instance: impl Into<String>, store: PasswordStore) -> Self {
        Self {
            instance: instance.into(),
            cache: BTreeMap::new(),
            store,
            secrets: Box::new(NoSecretService),
            prompt: Box::new(NonInteractive),
        }
    }

    pub fn with_secret_service<S>(mut self, secrets: S) -> Self
    where
        S: SecretService + Send + Sync + 'static,
    {
        self.secrets = Box::new(secrets);
        self
    }

    pub fn with_prompt<P>(mut self, prompt: P) -> Self
    where
        P: SecretPrompt + Send + Sync + 'static,
    {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn store(&self) -> &PasswordStore {
        &self.store
    }

    /// Replace the cache with the contents of the on-disk store.
    pub fn load(&mut self) -> CredentialResult<()> {
        self.cache = self.store.load()?;
        tracing::debug!(
            instance = %self.instance,
            entries = self.cache.len(),
            "Password cache loaded"
        );
        Ok(())
    }

    /// Resolve a credential by name.
    ///
    /// Blocks while the secret service or the prompt runs.
    pub fn resolve(&mut self, name: &str) -> CredentialResult<String> {
        self.resolve_labelled(name, name)
    }

    /// Resolve the password of a security token.
    ///
    /// The prompt, if reached, names the token rather than the credential.
    pub fn token_password(&mut self, token: &str) -> CredentialResult<String> {
        let name = credential_name_for_token(token);
        let label = if token.trim().is_empty() {
            name.clone()
        } else {
            token.to_string()
        };
        self.resolve_labelled(&name, &label)
    }

    fn resolve_labelled(&mut self, name: &str, label: &str) -> CredentialResult<String> {
        if let Some(secret) = self.cache.get(name) {
            metrics::record_credential_resolution("cache");
            return Ok(secret.clone());
        }

        let key = format!("{}/{}", self.instance, name);
        match self.secrets.get(&key) {
            Ok(Some(secret)) => {
                tracing::debug!(key = %key, "Password found in secret service");
                metrics::record_credential_resolution("secret_service");
                self.cache.insert(name.to_string(), secret.clone());
                return Ok(secret);
            }
            Ok(None) => {
                tracing::info!(key = %key, "Password unavailable in secret service");
            }
            Err(e) => {
                tracing::info!(key = %key, error = %e, "Secret service lookup failed");
            }
        }

        match self.prompt.prompt_secret(label) {
            Ok(secret) => {
                metrics::record_credential_resolution("prompt");
                self.cache.insert(name.to_string(), secret.clone());
                Ok(secret)
            }
            Err(PromptError::Disabled) => {
                metrics::record_credential_resolution("unavailable");
                Err(CredentialError::Unavailable {
                    name: name.to_string(),
                })
            }
            Err(PromptError::Io(source)) => Err(CredentialError::Prompt {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Write the entire cache to the on-disk store.
    pub fn persist(&self) -> CredentialResult<()> {
        self.store.store(&self.cache)?;
        Ok(())
    }

    /// Cached value, without consulting any other layer.
    pub fn get_cached(&self, name: &str) -> Option<&str> {
        self.cache.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        self.cache.insert(name.into(), secret.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cache.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("instance", &self.instance)
            .field("names", &self.cache.keys().collect::<Vec<_>>())
            .field("store", &self.store.path())
            .finish()
    }
}
