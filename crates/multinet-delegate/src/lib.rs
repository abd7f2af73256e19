//! Delegate model and execution for the `multinet` meta plugin.
//!
//! A *delegate* is one sub-plugin configuration that attaches one network to
//! a container. This crate owns everything needed to run a single delegate:
//!
//! - [`Delegate`] and [`DelegateKind`] describe the configuration and whether
//!   it is a single plugin or a plugin list.
//! - [`InvocationContext`] carries the per-invocation runtime values (container,
//!   namespace, interface name, arguments) explicitly instead of through the
//!   process environment.
//! - [`protocol`] drives the plugin execution protocol for both kinds of
//!   delegate on top of a [`PluginExec`] implementation, of which
//!   [`process::ProcessExec`] is the production one.
//! - [`DelegateInvoker`] checks the target namespace and dispatches a
//!   delegate's ADD or DEL; the orchestration engine talks to it through the
//!   [`DelegateRunner`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use multinet_delegate::{Delegate, DelegateInvoker, DelegateRunner, InvocationContext};
//! use multinet_delegate::netns::HostNamespaceInspector;
//! use multinet_delegate::process::ProcessExec;
//!
//! let delegate = Delegate::from_config(br#"{"cniVersion":"0.3.1","name":"lan","type":"bridge"}"#)
//!     .expect("valid delegate");
//! let context = InvocationContext::new("c0ffee", Some("/var/run/netns/demo".into()));
//! let invoker = DelegateInvoker::new(ProcessExec, HostNamespaceInspector);
//! // invoker.add("eth0", &delegate, &context) would run the bridge plugin.
//! ```

pub mod context;
pub mod descriptor;
pub mod error;
pub mod invoker;
pub mod netns;
pub mod process;
pub mod protocol;
pub mod result;
pub mod status;

#[cfg(test)]
mod tests;

pub use self::context::{InvocationContext, Operation};
pub use self::descriptor::{Delegate, DelegateKind};
pub use self::error::DelegateError;
pub use self::invoker::{DelegateInvoker, DelegateRunner};
pub use self::protocol::{PluginExec, PluginInvocation};
pub use self::result::{CniResult, Dns, ErrorDocument, Interface, IpConfig, Route};
pub use self::status::NetworkStatus;
