//! Pluggable interactive password prompt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    /// Prompting is not allowed in this context.
    #[error("Interactive prompt disabled")]
    Disabled,

    #[error("Failed to read from terminal: {0}")]
    Io(#[from] std::io::Error),
}

/// Last-resort source of a secret.
pub trait SecretPrompt {
    fn prompt_secret(&self, label: &str) -> Result<String, PromptError>;
}

/// Unattended mode: every prompt fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl SecretPrompt for NonInteractive {
    fn prompt_secret(&self, label: &str) -> Result<String, PromptError> {
        tracing::debug!(label = %label, "Prompt requested in non-interactive mode");
        Err(PromptError::Disabled)
    }
}

/// Reads a password from the controlling terminal without echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn prompt_secret(&self, label: &str) -> Result<String, PromptError> {
        Ok(rpassword::prompt_password(format!("Enter password for {}: ", label))?)
    }
}
