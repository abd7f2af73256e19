//! Network selection strings.
//!
//! Additional networks are requested either as a JSON array of selection
//! objects or as a compact comma-separated list such as
//! `prod/macvlan-conf@net1, sriov-conf`. Both forms produce the same
//! ordered list of [`NetworkSelection`] values.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One requested network attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSelection {
    name: String,
    namespace: Option<String>,
    ips: Vec<String>,
    mac: Option<String>,
    interface: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSelection {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    ips: Option<Vec<String>>,
    #[serde(default)]
    ip_request: Option<String>,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    mac_request: Option<String>,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    interface_request: Option<String>,
}

impl NetworkSelection {
    /// Creates a selection for `name` with no optional requests.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the requested interface name.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Sets the namespace of the selected network object.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Name of the selected network.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace of the selected network object, when known.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Requested IP addresses.
    #[must_use]
    pub fn ips(&self) -> &[String] {
        &self.ips
    }

    /// Requested MAC address.
    #[must_use]
    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    /// Requested interface name.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }
}

/// Parses a selection string into an ordered list of selections.
///
/// Selections without a namespace inherit `default_namespace` when one is
/// given.
///
/// ```
/// use multinet_config::parse_network_selection;
///
/// let selections = parse_network_selection("prod/macvlan@net1,sriov", Some("default"))
///     .expect("valid selection");
/// assert_eq!(selections[0].namespace(), Some("prod"));
/// assert_eq!(selections[0].interface(), Some("net1"));
/// assert_eq!(selections[1].namespace(), Some("default"));
/// ```
///
/// # Errors
///
/// Returns [`ConfigError::Selection`] for malformed JSON, empty elements,
/// empty names, or elements with more than one namespace or interface
/// separator.
pub fn parse_network_selection(
    text: &str,
    default_namespace: Option<&str>,
) -> Result<Vec<NetworkSelection>, ConfigError> {
    let trimmed = text.trim();
    let mut selections = if trimmed.starts_with('[') {
        parse_json(trimmed)?
    } else {
        parse_compact(trimmed)?
    };

    for selection in &mut selections {
        validate_component(text, "name", &selection.name)?;
        if let Some(namespace) = &selection.namespace {
            validate_component(text, "namespace", namespace)?;
        }
        if selection.namespace.is_none() {
            selection.namespace = default_namespace.map(str::to_owned);
        }
    }
    Ok(selections)
}

fn parse_json(text: &str) -> Result<Vec<NetworkSelection>, ConfigError> {
    let raw: Vec<RawSelection> = serde_json::from_str(text)
        .map_err(|error| ConfigError::selection(text, error.to_string()))?;
    Ok(raw
        .into_iter()
        .map(|entry| NetworkSelection {
            name: entry.name,
            namespace: entry.namespace.filter(|value| !value.is_empty()),
            ips: entry
                .ips
                .unwrap_or_else(|| entry.ip_request.into_iter().collect())
                .into_iter()
                .filter(|ip| !ip.is_empty())
                .collect(),
            mac: entry.mac.or(entry.mac_request).filter(|value| !value.is_empty()),
            interface: entry
                .interface
                .or(entry.interface_request)
                .filter(|value| !value.is_empty()),
        })
        .collect())
}

fn parse_compact(text: &str) -> Result<Vec<NetworkSelection>, ConfigError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    text.split(',')
        .map(|element| parse_element(text, element.trim()))
        .collect()
}

fn parse_element(text: &str, element: &str) -> Result<NetworkSelection, ConfigError> {
    if element.is_empty() {
        return Err(ConfigError::selection(text, "empty network element"));
    }

    let (reference, interface) = match element.split_once('@') {
        Some((_, interface)) if interface.contains('@') => {
            return Err(ConfigError::selection(
                text,
                format!("'{element}' has more than one interface separator"),
            ));
        }
        Some((reference, interface)) if interface.is_empty() => {
            return Err(ConfigError::selection(
                text,
                format!("'{reference}' requests an empty interface name"),
            ));
        }
        Some((reference, interface)) => (reference, Some(interface.to_owned())),
        None => (element, None),
    };

    let (namespace, name) = match reference.split_once('/') {
        Some((namespace, name)) => (Some(namespace.to_owned()), name.to_owned()),
        None => (None, reference.to_owned()),
    };

    Ok(NetworkSelection {
        name,
        namespace,
        interface,
        ..NetworkSelection::default()
    })
}

fn validate_component(text: &str, label: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::selection(text, format!("empty {label}")));
    }
    if value.contains('/') {
        return Err(ConfigError::selection(
            text,
            format!("{label} '{value}' must not contain '/'"),
        ));
    }
    Ok(())
}
