//! Meta plugin that attaches a container to several networks.
//!
//! `multinet` is invoked by a container runtime like any other network
//! plugin, but instead of configuring an interface itself it delegates to a
//! list of other plugins. The crate is organised around one state machine:
//!
//! - [`resolve`] assembles the ordered delegate list from the static
//!   configuration and, when a cluster is reachable, from the pod's networks
//!   annotation.
//! - [`allocator`] gives every delegate a distinct interface name and picks
//!   the master delegate whose result is returned to the runtime.
//! - [`engine`] runs ADD, DEL and GET. ADD persists the allocated list through
//!   [`store`] before touching any delegate and rolls back in reverse order on
//!   failure; DEL tears down in reverse and keeps a retry record for the
//!   delegates that failed.
//! - [`report`] publishes per-network status to the pod through [`cluster`].
//! - [`command`] binds all of the above to the process contract: environment
//!   variables and stdin in, a result or error document on stdout.
//!
//! Delegate execution itself lives in [`multinet_delegate`] and the
//! configuration surface in [`multinet_config`].

pub mod allocator;
pub mod cluster;
pub mod command;
pub mod engine;
pub mod error;
pub mod report;
pub mod resolve;
pub mod store;
pub mod telemetry;

pub use allocator::{Allocation, AllocationError, allocate};
pub use command::run;
pub use engine::Engine;
pub use error::{CommandError, EngineError};
pub use report::{PodStatusReporter, StatusReportError, StatusReporter};
pub use store::{DelegateStore, FileStore, StoreError};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
