//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle transition (start, stop, deploy, undeploy):
//!     → service signal sent (fire and forget)
//!     → polling.rs (sleep, probe, classify)
//!     → Ready | Fatal | budget exhausted
//! ```
//!
//! # Design Decisions
//! - Every wait has a budget unless the caller explicitly asks for none
//! - Fatal conditions (TLS misconfiguration) never burn the budget
//! - Classification of probe outcomes belongs to the caller

pub mod polling;

pub use polling::{poll_until, PollError, PollPolicy, PollStep, Polled};
