//! Delegate descriptors.
//!
//! A [`Delegate`] pairs the raw configuration of one sub-plugin with the
//! orchestration metadata the engine needs: the requested interface name,
//! whether it is the master delegate, and any per-attachment requests.
//! Descriptors serialise to the JSON records kept in the delegate store, with
//! the raw configuration embedded verbatim as text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DelegateError;

/// Which execution path a delegate uses.
///
/// # Example
///
/// ```
/// use multinet_delegate::{Delegate, DelegateKind};
///
/// let delegate = Delegate::from_config(
///     br#"{"name":"chain","plugins":[{"type":"ptp"},{"type":"portmap"}]}"#,
/// )
/// .expect("valid list");
/// assert!(matches!(delegate.kind(), DelegateKind::List { .. }));
/// assert_eq!(delegate.display_name(), "chain");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelegateKind {
    /// One plugin invoked directly with the raw configuration.
    Single {
        /// Plugin type, which names the executable.
        #[serde(rename = "type")]
        plugin_type: String,
        /// Network name declared by the configuration.
        #[serde(default)]
        name: String,
    },
    /// A plugin list executed entry by entry.
    List {
        /// Network name declared by the list.
        name: String,
        /// Plugin types of the list entries, in execution order.
        plugins: Vec<String>,
    },
}

/// One sub-plugin attachment and its orchestration metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegate {
    #[serde(flatten)]
    kind: DelegateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ifname_request: Option<String>,
    #[serde(default)]
    master: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mac: Option<String>,
    config: String,
}

impl Delegate {
    /// Parses a raw delegate configuration.
    ///
    /// A configuration with a non-empty `type` is a single plugin. Otherwise it
    /// must carry a non-empty `plugins` array whose first entry has a `type`.
    ///
    /// # Errors
    ///
    /// Returns [`DelegateError::InvalidConfig`] when the bytes are not a JSON
    /// object or match neither shape.
    pub fn from_config(bytes: &[u8]) -> Result<Self, DelegateError> {
        let document: Value =
            serde_json::from_slice(bytes).map_err(|error| DelegateError::InvalidConfig {
                message: error.to_string(),
            })?;
        let config = String::from_utf8(bytes.to_vec()).map_err(|error| {
            DelegateError::InvalidConfig {
                message: error.to_string(),
            }
        })?;
        let kind = classify(&document)?;

        Ok(Self {
            kind,
            ifname_request: None,
            master: false,
            ips: Vec::new(),
            mac: None,
            config,
        })
    }

    /// Sets or clears the requested interface name; empty names clear it.
    #[must_use]
    pub fn with_ifname_request(mut self, ifname: Option<String>) -> Self {
        self.ifname_request = ifname.filter(|name| !name.is_empty());
        self
    }

    /// Marks the delegate as master or not.
    #[must_use]
    pub const fn with_master(mut self, master: bool) -> Self {
        self.master = master;
        self
    }

    /// Records addresses requested for this attachment.
    #[must_use]
    pub fn with_ips(mut self, ips: Vec<String>) -> Self {
        self.ips = ips;
        self
    }

    /// Records the MAC address requested for this attachment.
    #[must_use]
    pub fn with_mac(mut self, mac: Option<String>) -> Self {
        self.mac = mac.filter(|value| !value.is_empty());
        self
    }

    /// Execution path of the delegate.
    #[must_use]
    pub const fn kind(&self) -> &DelegateKind {
        &self.kind
    }

    /// Requested interface name, if any.
    #[must_use]
    pub fn ifname_request(&self) -> Option<&str> {
        self.ifname_request.as_deref()
    }

    /// Whether this delegate's result is the overall result.
    #[must_use]
    pub const fn is_master(&self) -> bool {
        self.master
    }

    /// Addresses requested for this attachment.
    #[must_use]
    pub fn ips(&self) -> &[String] {
        &self.ips
    }

    /// MAC address requested for this attachment.
    #[must_use]
    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    /// Raw configuration bytes, exactly as supplied.
    #[must_use]
    pub fn config_bytes(&self) -> &[u8] {
        self.config.as_bytes()
    }

    /// Name used in diagnostics: the plugin type or the list name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match &self.kind {
            DelegateKind::Single { plugin_type, .. } => plugin_type,
            DelegateKind::List { name, .. } => name,
        }
    }

    /// Logical network name reported in attachment status.
    #[must_use]
    pub fn network_name(&self) -> &str {
        match &self.kind {
            DelegateKind::Single { name, .. } | DelegateKind::List { name, .. } => name,
        }
    }

    /// Extra `CNI_ARGS` pairs for this attachment only.
    #[must_use]
    pub fn request_args(&self) -> Vec<(String, String)> {
        let mut args = Vec::new();
        if !self.ips.is_empty() {
            args.push((String::from("IP"), self.ips.join(",")));
        }
        if let Some(mac) = &self.mac {
            args.push((String::from("MAC"), mac.clone()));
        }
        args
    }
}

fn classify(document: &Value) -> Result<DelegateKind, DelegateError> {
    let Some(object) = document.as_object() else {
        return Err(DelegateError::InvalidConfig {
            message: String::from("delegate configuration must be a JSON object"),
        });
    };
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    if let Some(plugin_type) = non_empty_type(document) {
        return Ok(DelegateKind::Single {
            plugin_type: plugin_type.to_owned(),
            name,
        });
    }

    let entries = object
        .get("plugins")
        .and_then(Value::as_array)
        .filter(|entries| !entries.is_empty())
        .ok_or_else(|| DelegateError::InvalidConfig {
            message: String::from("delegate must have the 'type' or 'plugins' field"),
        })?;

    let mut plugins = Vec::with_capacity(entries.len());
    for entry in entries {
        let plugin_type = non_empty_type(entry).ok_or_else(|| DelegateError::InvalidConfig {
            message: format!("every entry of plugin list '{name}' must have the 'type' field"),
        })?;
        plugins.push(plugin_type.to_owned());
    }

    Ok(DelegateKind::List { name, plugins })
}

fn non_empty_type(document: &Value) -> Option<&str> {
    document
        .get("type")
        .and_then(Value::as_str)
        .filter(|plugin_type| !plugin_type.is_empty())
}
