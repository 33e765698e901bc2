//! Instance management subsystem.
//!
//! # Data Flow
//! ```text
//! InstanceManager::open(name, settings)
//!     → paths.rs (base dir, conf files, service environment file)
//!     → load(): tomcat.conf layers → password.conf → subsystems
//!     → lifecycle(): start/stop/deploy through LifecycleController
//!     → remove(self): provisioner deletes the footprint
//! ```
//!
//! # Design Decisions
//! - The manager owns every per-instance cache; removing it drops them
//! - Subsystems load through a registry so callers can plug in loaders
//! - Filesystem creation and removal sit behind `Provisioner`

pub mod manager;
pub mod paths;
pub mod provision;
pub mod subsystem;

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::lifecycle::LifecycleError;
use crate::server_config::ServerConfigError;

pub use manager::{ConfigLayers, InstanceIdentity, InstanceManager, CERT_KEY_ALIAS, SECURE_CONNECTOR};
pub use paths::InstancePaths;
pub use provision::{FsProvisioner, Provisioner};
pub use subsystem::{Subsystem, SubsystemKind, SubsystemLoader, SubsystemRegistry};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("{0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server configuration error: {0}")]
    Config(#[from] ServerConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Failed to load {kind} subsystem: {source}")]
    Subsystem {
        kind: SubsystemKind,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type InstanceResult<T> = Result<T, InstanceError>;
