//! PKI server instance management library.
//!
//! Manages a certificate-authority server hosted in Tomcat: editing its
//! `server.xml`, starting and stopping it with observable readiness,
//! deploying web applications, and resolving the secrets it needs.

pub mod config;
pub mod credentials;
pub mod instance;
pub mod lifecycle;
pub mod observability;
pub mod properties;
pub mod resilience;
pub mod server_config;

pub use config::ManagerConfig;
pub use credentials::CredentialResolver;
pub use instance::InstanceManager;
pub use lifecycle::{LifecycleController, WaitOptions};
pub use server_config::ServerConfig;
