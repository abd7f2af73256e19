//! Network attachment status derived from a delegate result.

use serde::{Deserialize, Serialize};

use crate::result::{CniResult, Dns};

/// Observable status of one network attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Logical network name.
    pub name: String,
    /// Interface name inside the container.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,
    /// Assigned addresses without prefix length.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
    /// Hardware address of the container interface.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,
    /// Whether this attachment carries the default route.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    /// DNS settings reported by the plugin.
    #[serde(default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

impl NetworkStatus {
    /// Builds the status for the network `name` from its attachment result.
    ///
    /// Only interfaces placed in a sandbox describe the container side, so the
    /// last such interface provides the name and MAC.
    ///
    /// # Example
    ///
    /// ```
    /// use multinet_delegate::{CniResult, NetworkStatus};
    ///
    /// let result = CniResult::from_slice(br#"{
    ///     "cniVersion": "0.4.0",
    ///     "interfaces": [
    ///         {"name": "veth12ab", "mac": "ee:ee:ee:ee:ee:ee"},
    ///         {"name": "eth0", "mac": "0a:58:0a:f4:00:05", "sandbox": "/proc/7/ns/net"}
    ///     ],
    ///     "ips": [{"version": "4", "address": "10.244.0.5/24", "interface": 1}]
    /// }"#).expect("result");
    /// let status = NetworkStatus::from_result(&result, "podnet", true);
    /// assert_eq!(status.interface, "eth0");
    /// assert_eq!(status.ips, vec!["10.244.0.5".to_owned()]);
    /// ```
    #[must_use]
    pub fn from_result(result: &CniResult, name: &str, default: bool) -> Self {
        let mut status = Self {
            name: name.to_owned(),
            default,
            dns: result.dns.clone(),
            ..Self::default()
        };

        for interface in result
            .interfaces
            .iter()
            .filter(|interface| !interface.sandbox.is_empty())
        {
            status.interface.clone_from(&interface.name);
            status.mac.clone_from(&interface.mac);
        }

        status.ips = result
            .ips
            .iter()
            .filter(|ip| matches!(ip.family(), "4" | "6"))
            .map(|ip| ip.host().to_owned())
            .collect();

        status
    }
}
