//! OS service control.
//!
//! Start and stop are fire-and-forget: the service manager acknowledges the
//! request, readiness is established separately by polling.

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Process-control seam for an instance's OS service.
///
/// `service_id` is the unit instance name, e.g. `tomcat@pki-tomcat`.
pub trait ServiceManager {
    fn start_signal(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn stop_signal(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn is_active(&self, service_id: &str) -> impl Future<Output = Result<bool, ServiceError>> + Send;

    fn enable(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn disable(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// `systemctl` driver.
#[derive(Debug, Clone)]
pub struct SystemdServiceManager {
    systemctl: PathBuf,
}

impl SystemdServiceManager {
    pub fn new() -> Self {
        Self::with_command("systemctl")
    }

    pub fn with_command(systemctl: impl Into<PathBuf>) -> Self {
        Self {
            systemctl: systemctl.into(),
        }
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.systemctl.display(), args.join(" "))
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output, ServiceError> {
        let command = self.describe(&args);
        tracing::debug!(command = %command, "Running service command");

        Command::new(&self.systemctl)
            .args(&args)
            .output()
            .await
            .map_err(|source| ServiceError::Spawn { command, source })
    }

    async fn checked(&self, verb: &str, service_id: &str) -> Result<(), ServiceError> {
        let args = vec![verb.to_string(), unit(service_id)];
        let output = self.run(args.clone()).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ServiceError::Failed {
                command: self.describe(&args),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for SystemdServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn unit(service_id: &str) -> String {
    format!("{service_id}.service")
}

impl ServiceManager for SystemdServiceManager {
    async fn start_signal(&self, service_id: &str) -> Result<(), ServiceError> {
        self.checked("start", service_id).await
    }

    async fn stop_signal(&self, service_id: &str) -> Result<(), ServiceError> {
        self.checked("stop", service_id).await
    }

    async fn is_active(&self, service_id: &str) -> Result<bool, ServiceError> {
        let args = vec!["--quiet".to_string(), "is-active".to_string(), unit(service_id)];
        let output = self.run(args).await?;
        Ok(output.status.success())
    }

    async fn enable(&self, service_id: &str) -> Result<(), ServiceError> {
        self.checked("enable", service_id).await
    }

    async fn disable(&self, service_id: &str) -> Result<(), ServiceError> {
        self.checked("disable", service_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let manager = SystemdServiceManager::with_command("/nonexistent/systemctl");
        let err = manager.start_signal("tomcat@pki-tomcat").await.unwrap_err();

        match err {
            ServiceError::Spawn { command, .. } => {
                assert_eq!(command, "/nonexistent/systemctl start tomcat@pki-tomcat.service");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_drives_result() {
        let ok = SystemdServiceManager::with_command("true");
        assert!(ok.stop_signal("tomcat@pki-tomcat").await.is_ok());
        assert!(ok.is_active("tomcat@pki-tomcat").await.unwrap());

        let failing = SystemdServiceManager::with_command("false");
        assert!(matches!(
            failing.enable("tomcat@pki-tomcat").await,
            Err(ServiceError::Failed { .. })
        ));
        assert!(!failing.is_active("tomcat@pki-tomcat").await.unwrap());
    }
}
