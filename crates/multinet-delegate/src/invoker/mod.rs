//! Delegate invoker.
//!
//! The [`DelegateInvoker`] runs one delegate's ADD or DEL. It scopes the
//! invocation context to the delegate's interface and per-attachment
//! arguments, checks the container namespace before ADD, and dispatches on
//! [`DelegateKind`] to the single-plugin or plugin-list protocol path.
//!
//! The orchestration engine depends on the [`DelegateRunner`] trait rather
//! than on the invoker itself, so engine tests can substitute scripted
//! runners.

use tracing::{debug, info};

use crate::context::InvocationContext;
use crate::descriptor::{Delegate, DelegateKind};
use crate::error::DelegateError;
use crate::netns::NamespaceInspector;
use crate::protocol::{self, PluginExec};
use crate::result::CniResult;

/// Tracing target for delegate invocation.
const INVOKER_TARGET: &str = "multinet_delegate::invoker";

/// Runs ADD and DEL for individual delegates.
pub trait DelegateRunner {
    /// Attaches `delegate` as interface `ifname`.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegateError`] when the namespace check or the plugin
    /// invocation fails.
    fn add(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<CniResult, DelegateError>;

    /// Detaches `delegate` from interface `ifname`.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegateError`] when the plugin invocation fails.
    fn del(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<(), DelegateError>;
}

impl<T: DelegateRunner + ?Sized> DelegateRunner for &T {
    fn add(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<CniResult, DelegateError> {
        (**self).add(ifname, delegate, context)
    }

    fn del(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<(), DelegateError> {
        (**self).del(ifname, delegate, context)
    }
}

/// Production [`DelegateRunner`] built on a plugin executor and a namespace
/// inspector.
///
/// # Example
///
/// ```
/// use multinet_delegate::netns::{NamespaceInspector, NetnsError};
/// use multinet_delegate::{
///     Delegate, DelegateError, DelegateInvoker, DelegateRunner, InvocationContext, PluginExec,
///     PluginInvocation,
/// };
///
/// struct Echo;
/// impl PluginExec for Echo {
///     fn exec(&self, _invocation: &PluginInvocation) -> Result<Vec<u8>, DelegateError> {
///         Ok(br#"{"cniVersion":"0.4.0"}"#.to_vec())
///     }
/// }
///
/// struct EmptyNamespace;
/// impl NamespaceInspector for EmptyNamespace {
///     fn interface_exists(&self, _netns: &str, _ifname: &str) -> Result<bool, NetnsError> {
///         Ok(false)
///     }
/// }
///
/// let invoker = DelegateInvoker::new(Echo, EmptyNamespace);
/// let delegate = Delegate::from_config(br#"{"name":"lan","type":"bridge"}"#).expect("delegate");
/// let context = InvocationContext::new("c0ffee", Some("/var/run/netns/demo".into()));
/// let result = invoker.add("eth0", &delegate, &context).expect("add");
/// assert_eq!(result.cni_version, "0.4.0");
/// ```
#[derive(Debug, Clone)]
pub struct DelegateInvoker<E, N> {
    exec: E,
    inspector: N,
}

impl<E, N> DelegateInvoker<E, N> {
    /// Creates an invoker.
    pub const fn new(exec: E, inspector: N) -> Self {
        Self { exec, inspector }
    }
}

impl<E: PluginExec, N: NamespaceInspector> DelegateRunner for DelegateInvoker<E, N> {
    fn add(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<CniResult, DelegateError> {
        let netns = context
            .netns()
            .filter(|netns| !netns.is_empty())
            .ok_or_else(|| DelegateError::NamespaceUnavailable {
                netns: String::new(),
                message: String::from("no network namespace was supplied"),
            })?;
        if self.inspector.interface_exists(netns, ifname)? {
            return Err(DelegateError::InterfaceNameCollision {
                ifname: ifname.to_owned(),
                netns: netns.to_owned(),
            });
        }

        let scoped = scope(ifname, delegate, context);
        info!(
            target: INVOKER_TARGET,
            delegate = delegate.display_name(),
            ifname,
            "adding delegate"
        );
        match delegate.kind() {
            DelegateKind::Single { plugin_type, .. } => {
                protocol::add_single(&self.exec, plugin_type, delegate.config_bytes(), &scoped)
            }
            DelegateKind::List { .. } => {
                protocol::add_list(&self.exec, delegate.config_bytes(), &scoped)
            }
        }
    }

    fn del(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<(), DelegateError> {
        let scoped = scope(ifname, delegate, context);
        info!(
            target: INVOKER_TARGET,
            delegate = delegate.display_name(),
            ifname,
            "deleting delegate"
        );
        let outcome = match delegate.kind() {
            DelegateKind::Single { plugin_type, .. } => {
                protocol::del_single(&self.exec, plugin_type, delegate.config_bytes(), &scoped)
            }
            DelegateKind::List { .. } => {
                protocol::del_list(&self.exec, delegate.config_bytes(), &scoped)
            }
        };
        if let Err(error) = &outcome {
            debug!(
                target: INVOKER_TARGET,
                delegate = delegate.display_name(),
                ifname,
                %error,
                "delegate teardown failed"
            );
        }
        outcome
    }
}

fn scope(ifname: &str, delegate: &Delegate, context: &InvocationContext) -> InvocationContext {
    context
        .for_interface(ifname)
        .with_extra_args(delegate.request_args())
}
