//! Server configuration tree (`server.xml`).
//!
//! # Data Flow
//! ```text
//! server.xml bytes
//!     → tree.rs (parse into node arena, NodeId handles)
//!     → server.rs (Connector / SSLHostConfig / Certificate / Listener views)
//!     → callers mutate through handles
//!     → save() serializes the whole tree back to disk
//! ```
//!
//! # Design Decisions
//! - Handles, not references: callers hold `NodeId`s that are only valid for
//!   the `ServerConfig` that returned them
//! - Mutations stay in memory until `save()`
//! - Unknown elements and attributes are carried through untouched

pub mod server;
pub mod tree;

use thiserror::Error;

pub use server::{ConnectorSummary, ServerConfig, DEFAULT_CERT_TYPE, DEFAULT_SSL_HOST};
pub use tree::{Document, NodeId, Placement};

/// Errors raised while reading or editing the server configuration.
#[derive(Debug, Error)]
pub enum ServerConfigError {
    /// A keyed lookup found no matching node.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The document does not have the shape an operation needs.
    #[error("Invalid server configuration: {0}")]
    InvalidState(String),

    /// Malformed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Reading or writing the file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerConfigResult<T> = Result<T, ServerConfigError>;
