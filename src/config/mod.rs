//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → handed to InstanceManager and the CLI
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::CredentialsConfig;
pub use schema::InstanceConfig;
pub use schema::LifecycleConfig;
pub use schema::ManagerConfig;
pub use schema::ObservabilityConfig;
pub use schema::PathsConfig;
