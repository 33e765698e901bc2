//! Server and web application state machines.
//!
//! # States
//! - Server: Stopped, Starting, Running, Stopping
//! - Web application: Absent, Starting, Present, Stopping
//!
//! # State Transitions
//! ```text
//! Stopped → Starting: start signal sent
//! Starting → Running: readiness probe got an HTTP reply
//! Running → Stopping: stop signal sent
//! Stopping → Stopped: readiness probe could not connect
//! Starting/Stopping → previous: timeout or TLS failure
//! ```
//!
//! # Design Decisions
//! - State is what this process last observed, not ground truth
//! - Transitions are logged for observability

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WebappState {
    #[default]
    Absent,
    Starting,
    Present,
    Stopping,
}

impl WebappState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Starting => "starting",
            Self::Present => "present",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for WebappState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
