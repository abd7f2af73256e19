//! Result and error documents exchanged with delegate plugins.
//!
//! Plugins print either a result document on success or an error document on
//! failure. Results come in two shapes: the current one with `interfaces` and
//! `ips`, and the legacy one with `ip4`/`ip6` blocks used by the oldest
//! protocol versions. [`CniResult::from_slice`] accepts both and always yields
//! the current shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of attaching one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniResult {
    /// Protocol version the result is expressed in.
    #[serde(default)]
    pub cni_version: String,
    /// Interfaces created or configured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
    /// Addresses assigned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,
    /// Routes installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// DNS settings.
    #[serde(default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

/// Interface entry of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name.
    pub name: String,
    /// Hardware address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,
    /// Namespace path when the interface lives inside the container.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sandbox: String,
}

/// Address entry of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    /// Address family, `"4"` or `"6"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Index into [`CniResult::interfaces`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,
    /// Address in CIDR notation.
    pub address: String,
    /// Gateway address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

impl IpConfig {
    /// Address family, inferred from the address when not stated.
    #[must_use]
    pub fn family(&self) -> &str {
        match self.version.as_deref() {
            Some(version) => version,
            None if self.address.contains(':') => "6",
            None => "4",
        }
    }

    /// Address without its prefix length.
    #[must_use]
    pub fn host(&self) -> &str {
        self.address
            .split_once('/')
            .map_or(self.address.as_str(), |(host, _)| host)
    }
}

/// Route entry of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination in CIDR notation.
    pub dst: String,
    /// Next hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
}

/// DNS settings of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns {
    /// Name servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    /// Local domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Search domains.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    /// Resolver options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Dns {
    /// Returns `true` when no DNS setting is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty()
            && self.domain.is_none()
            && self.search.is_empty()
            && self.options.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyResult {
    #[serde(default)]
    cni_version: String,
    ip4: Option<LegacyIp>,
    ip6: Option<LegacyIp>,
    #[serde(default)]
    dns: Dns,
}

#[derive(Deserialize)]
struct LegacyIp {
    ip: String,
    gateway: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

impl CniResult {
    /// Returns a result with no content for `cni_version`.
    #[must_use]
    pub fn empty(cni_version: impl Into<String>) -> Self {
        Self {
            cni_version: cni_version.into(),
            ..Self::default()
        }
    }

    /// Parses a result in either the current or the legacy shape.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the bytes match neither shape.
    ///
    /// # Example
    ///
    /// ```
    /// use multinet_delegate::CniResult;
    ///
    /// let result = CniResult::from_slice(
    ///     br#"{"cniVersion":"0.2.0","ip4":{"ip":"10.1.0.5/16","gateway":"10.1.0.1"}}"#,
    /// )
    /// .expect("legacy result");
    /// assert_eq!(result.ips[0].address, "10.1.0.5/16");
    /// assert_eq!(result.ips[0].family(), "4");
    /// ```
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let document: Value = serde_json::from_slice(bytes)?;
        let legacy = document.get("ips").is_none()
            && (document.get("ip4").is_some() || document.get("ip6").is_some());
        if !legacy {
            return serde_json::from_value(document);
        }

        let LegacyResult {
            cni_version,
            ip4,
            ip6,
            dns,
        } = serde_json::from_value(document)?;
        let mut result = Self {
            cni_version,
            dns,
            ..Self::default()
        };
        for (family, block) in [("4", ip4), ("6", ip6)] {
            let Some(block) = block else { continue };
            result.ips.push(IpConfig {
                version: Some(family.to_owned()),
                interface: None,
                address: block.ip,
                gateway: block.gateway,
            });
            result.routes.extend(block.routes);
        }
        Ok(result)
    }

    /// Parses an optional `prevResult` value.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the value is not a result.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::from_slice(&serde_json::to_vec(value)?)
    }
}

/// Error document printed by a failing plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDocument {
    /// Protocol version.
    #[serde(default)]
    pub cni_version: String,
    /// Numeric error code.
    pub code: u32,
    /// Short message.
    #[serde(default)]
    pub msg: String,
    /// Additional detail.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl ErrorDocument {
    /// Creates an error document.
    #[must_use]
    pub fn new(
        cni_version: impl Into<String>,
        code: u32,
        msg: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            cni_version: cni_version.into(),
            code,
            msg: msg.into(),
            details: details.into(),
        }
    }

    /// Message and details joined for display.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.details.is_empty() {
            self.msg.clone()
        } else {
            format!("{}; {}", self.msg, self.details)
        }
    }
}
