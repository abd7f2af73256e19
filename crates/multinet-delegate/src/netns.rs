//! Container network namespace inspection.
//!
//! Before a delegate's ADD the target interface name must not already exist
//! inside the container. [`HostNamespaceInspector`] answers that by entering
//! the namespace on a dedicated thread, so the calling thread never changes
//! namespace, and resolving the name to an interface index there.

use std::fs::File;
use std::sync::Arc;

use nix::errno::Errno;
use nix::net::if_::if_nametoindex;
use nix::sched::{CloneFlags, setns};
use thiserror::Error;
use tracing::debug;

use crate::error::DelegateError;

/// Tracing target for namespace inspection.
const NETNS_TARGET: &str = "multinet_delegate::netns";

/// Errors raised while inspecting a network namespace.
#[derive(Debug, Clone, Error)]
pub enum NetnsError {
    /// The namespace path could not be opened.
    #[error("failed to open network namespace '{netns}': {source}")]
    Open {
        /// Namespace path.
        netns: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Switching the inspection thread into the namespace failed.
    #[error("failed to enter network namespace '{netns}': {source}")]
    Enter {
        /// Namespace path.
        netns: String,
        /// Error reported by `setns`.
        #[source]
        source: Errno,
    },

    /// Looking up the interface failed for a reason other than absence.
    #[error("failed to look up interface '{ifname}' in '{netns}': {source}")]
    Lookup {
        /// Namespace path.
        netns: String,
        /// Interface name.
        ifname: String,
        /// Error reported by `if_nametoindex`.
        #[source]
        source: Errno,
    },

    /// The inspection thread panicked.
    #[error("namespace inspection thread for '{netns}' panicked")]
    ThreadPanicked {
        /// Namespace path.
        netns: String,
    },
}

impl From<NetnsError> for DelegateError {
    fn from(error: NetnsError) -> Self {
        match &error {
            NetnsError::Open { netns, .. } => Self::NamespaceUnavailable {
                netns: netns.clone(),
                message: error.to_string(),
            },
            NetnsError::Enter { netns, .. }
            | NetnsError::Lookup { netns, .. }
            | NetnsError::ThreadPanicked { netns } => Self::NamespaceInspection {
                netns: netns.clone(),
                message: error.to_string(),
            },
        }
    }
}

/// Checks whether an interface exists inside a network namespace.
pub trait NamespaceInspector {
    /// Returns `true` when `ifname` exists inside the namespace at `netns`.
    ///
    /// # Errors
    ///
    /// Returns a [`NetnsError`] when the namespace cannot be opened or
    /// inspected.
    fn interface_exists(&self, netns: &str, ifname: &str) -> Result<bool, NetnsError>;
}

/// Inspects namespaces of the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostNamespaceInspector;

impl NamespaceInspector for HostNamespaceInspector {
    fn interface_exists(&self, netns: &str, ifname: &str) -> Result<bool, NetnsError> {
        let handle = File::open(netns).map_err(|source| NetnsError::Open {
            netns: netns.to_owned(),
            source: Arc::new(source),
        })?;
        let path = netns.to_owned();
        let name = ifname.to_owned();

        let worker = std::thread::spawn(move || -> Result<bool, NetnsError> {
            setns(&handle, CloneFlags::CLONE_NEWNET).map_err(|source| NetnsError::Enter {
                netns: path.clone(),
                source,
            })?;
            match if_nametoindex(name.as_str()) {
                Ok(_) => Ok(true),
                Err(Errno::ENODEV) => Ok(false),
                Err(source) => Err(NetnsError::Lookup {
                    netns: path,
                    ifname: name,
                    source,
                }),
            }
        });

        let exists = worker.join().map_err(|_| NetnsError::ThreadPanicked {
            netns: netns.to_owned(),
        })??;
        debug!(
            target: NETNS_TARGET,
            netns,
            ifname,
            exists,
            "inspected container namespace"
        );
        Ok(exists)
    }
}
