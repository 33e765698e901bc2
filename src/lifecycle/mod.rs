//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start/stop (controller.rs):
//!     server.xml → endpoint → service.rs signal → polling → state.rs
//!
//! deploy/undeploy (controller.rs):
//!     descriptor → webapp.rs store → polling of the context path
//!
//! Probing (probe.rs):
//!     GET → Responded(status) | Transport(reason) | Tls(reason)
//! ```
//!
//! # Design Decisions
//! - Service control, probing and descriptor storage are traits so the
//!   controller runs against fakes in tests
//! - TLS failures abort a wait; transport failures only cost time

pub mod controller;
pub mod probe;
pub mod service;
pub mod state;
pub mod webapp;

pub use controller::{LifecycleController, LifecycleError, LifecycleResult, WaitOptions, DEFAULT_MAX_WAIT};
pub use probe::{HttpProbe, ProbeOutcome, ReadinessProbe};
pub use service::{ServiceError, ServiceManager, SystemdServiceManager};
pub use state::{ServerState, WebappState};
pub use webapp::{DescriptorStore, FsDescriptorStore, Webapp, ROOT_WEBAPP};
