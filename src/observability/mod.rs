//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (probe, transition and credential counters)
//!     → spans.rs (one span per lifecycle operation, with an operation ID)
//!
//! Consumers:
//!     → stderr (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Secrets are never recorded as fields
//! - Metrics are recorded unconditionally; without an installed recorder
//!   they are no-ops

pub mod logging;
pub mod metrics;
pub mod spans;
