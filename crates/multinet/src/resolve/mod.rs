//! Delegate list resolution.
//!
//! The ordered delegate list is assembled from three sources:
//!
//! 1. the inline `delegates` array of the network configuration,
//! 2. the networks named by `defaultDelegates`, looked up in `confDir`,
//! 3. the networks named by the pod's networks annotation, also looked up in
//!    `confDir`, when a cluster is reachable and the runtime passed the pod
//!    identity.
//!
//! Static sources come first and dynamic ones are appended, which fixes the
//! ADD order and therefore the reverse DEL order.

use multinet_config::{
    ConfigError, NetConf, NetworkSelection, RuntimeArgs, find_network_config,
    parse_network_selection,
};
use multinet_delegate::{Delegate, DelegateError};
use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::{ClusterError, NETWORKS_ANNOTATION, PodClient};
use crate::error::{CODE_DECODING_FAILURE, CODE_INVALID_NETWORK_CONFIG, CODE_IO_FAILURE};

const RESOLVE_TARGET: &str = "multinet::resolve";

/// Errors raised while assembling the delegate list.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A selection string or configuration file is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A delegate configuration is neither a single plugin nor a list.
    #[error("network '{network}' has an invalid delegate configuration: {source}")]
    Delegate {
        /// Network name or inline position.
        network: String,
        /// Underlying descriptor error.
        #[source]
        source: Box<DelegateError>,
    },

    /// The pod could not be read.
    #[error("failed to read pod for network selection: {0}")]
    Cluster(#[from] ClusterError),
}

impl ResolveError {
    /// Numeric protocol error code for this failure.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Config(ConfigError::Parse { .. }) => CODE_DECODING_FAILURE,
            Self::Config(ConfigError::File { .. }) | Self::Cluster(_) => CODE_IO_FAILURE,
            Self::Config(_) | Self::Delegate { .. } => CODE_INVALID_NETWORK_CONFIG,
        }
    }
}

/// Builds the ordered delegate list for one invocation.
///
/// `pods` is the cluster client when one is configured. Without it, or
/// without pod identity in `args`, only static delegates are returned. An
/// empty or absent networks annotation contributes nothing.
///
/// # Errors
///
/// Returns a [`ResolveError`] when a configuration is invalid, a named
/// network cannot be found, or the pod cannot be read.
pub fn resolve_delegates(
    netconf: &NetConf,
    args: &RuntimeArgs,
    pods: Option<&dyn PodClient>,
) -> Result<Vec<Delegate>, ResolveError> {
    let mut delegates = static_delegates(netconf)?;
    let statics = delegates.len();

    if let Some(client) = pods {
        delegates.extend(dynamic_delegates(netconf, args, client)?);
    }

    info!(
        target: RESOLVE_TARGET,
        static_delegates = statics,
        dynamic_delegates = delegates.len().saturating_sub(statics),
        "resolved delegate list"
    );
    Ok(delegates)
}

fn static_delegates(netconf: &NetConf) -> Result<Vec<Delegate>, ResolveError> {
    let mut delegates = Vec::new();
    for (index, raw) in netconf.delegates().iter().enumerate() {
        let delegate =
            Delegate::from_config(raw.get().as_bytes()).map_err(|source| ResolveError::Delegate {
                network: format!("delegates[{index}]"),
                source: Box::new(source),
            })?;
        delegates.push(delegate);
    }

    if let Some(selection) = netconf
        .default_delegates()
        .filter(|text| !text.trim().is_empty())
    {
        for request in parse_network_selection(selection, None)? {
            delegates.push(selected_delegate(netconf, &request)?);
        }
    }
    Ok(delegates)
}

fn dynamic_delegates(
    netconf: &NetConf,
    args: &RuntimeArgs,
    pods: &dyn PodClient,
) -> Result<Vec<Delegate>, ResolveError> {
    let (Some(namespace), Some(name)) = (args.pod_namespace(), args.pod_name()) else {
        debug!(
            target: RESOLVE_TARGET,
            "runtime did not identify a pod; skipping dynamic networks"
        );
        return Ok(Vec::new());
    };

    let pod = pods.get_pod(namespace, name)?;
    let Some(annotation) = pod
        .annotation(NETWORKS_ANNOTATION)
        .filter(|text| !text.trim().is_empty())
    else {
        debug!(
            target: RESOLVE_TARGET,
            namespace,
            pod = name,
            "pod requests no additional networks"
        );
        return Ok(Vec::new());
    };

    let requests = parse_network_selection(annotation, Some(namespace))?;
    requests
        .iter()
        .map(|request| selected_delegate(netconf, request))
        .collect()
}

fn selected_delegate(
    netconf: &NetConf,
    request: &NetworkSelection,
) -> Result<Delegate, ResolveError> {
    let bytes = find_network_config(netconf.conf_dir(), request.name())?;
    let delegate = Delegate::from_config(&bytes).map_err(|source| ResolveError::Delegate {
        network: request.name().to_owned(),
        source: Box::new(source),
    })?;
    debug!(
        target: RESOLVE_TARGET,
        network = request.name(),
        ifname = request.interface().unwrap_or_default(),
        "selected network"
    );
    Ok(delegate
        .with_ifname_request(request.interface().map(str::to_owned))
        .with_ips(request.ips().to_vec())
        .with_mac(request.mac().map(str::to_owned)))
}
