//! Configuration schema definitions.
//!
//! This module defines the settings of the `pki-server` tool itself, as
//! opposed to the per-instance `server.xml` and `tomcat.conf` it manages.
//! All types derive Serde traits for deserialization from a TOML file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// Where instances and shared Tomcat files live.
    pub paths: PathsConfig,

    /// Identity defaults for managed instances.
    pub instance: InstanceConfig,

    /// Start/stop/deploy waiting behaviour.
    pub lifecycle: LifecycleConfig,

    /// Credential resolution behaviour.
    pub credentials: CredentialsConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Filesystem layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Parent directory of all instance base directories.
    pub instances_dir: PathBuf,

    /// System-wide Tomcat settings, the first configuration layer.
    pub global_tomcat_conf: PathBuf,

    /// Package defaults, the second configuration layer.
    pub package_tomcat_conf: PathBuf,

    /// Directory holding per-service environment files.
    pub sysconfig_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            instances_dir: PathBuf::from("/var/lib/tomcats"),
            global_tomcat_conf: PathBuf::from("/etc/tomcat/tomcat.conf"),
            package_tomcat_conf: PathBuf::from("/usr/share/pki/etc/tomcat.conf"),
            sysconfig_dir: PathBuf::from("/etc/sysconfig"),
        }
    }
}

/// Instance identity defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Service template prefix; the unit is `<instance_type>@<name>`.
    pub instance_type: String,

    /// Owner of instance files.
    pub user: String,

    /// Group of instance files.
    pub group: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_type: "tomcat".to_string(),
            user: "tomcat".to_string(),
            group: "tomcat".to_string(),
        }
    }
}

/// Lifecycle polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Host name used to reach the instance's own connectors.
    pub hostname: String,

    /// Delay before each readiness probe in milliseconds.
    pub poll_interval_ms: u64,

    /// Default wait budget in seconds; 0 waits forever.
    pub max_wait_secs: u64,

    /// Per-probe network timeout in seconds; absent means no timeout.
    pub probe_timeout_secs: Option<u64>,
}

impl LifecycleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        match self.max_wait_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            poll_interval_ms: 1000,
            max_wait_secs: 60,
            probe_timeout_secs: None,
        }
    }
}

/// Credential resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Allow prompting on the terminal as the last resort.
    pub interactive: bool,

    /// Consult the kernel keyring before prompting.
    pub use_keyring: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            use_keyring: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
