//! Plugin invocation environment.
//!
//! The container runtime describes each invocation through `CNI_*`
//! environment variables. [`PluginEnvironment::from_vars`] maps each
//! variable it is given onto a long flag of a `clap` parser; nothing is read
//! from the process environment, so callers decide exactly which variables
//! take part.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use clap::Parser;
use strum::{Display, EnumString};

use crate::error::ConfigError;

/// Operation requested by the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Command {
    /// Attach every delegate network to the container.
    Add,
    /// Detach every previously attached delegate network.
    Del,
    /// Report the previously recorded result.
    Get,
    /// Report the protocol versions this plugin understands.
    Version,
}

#[derive(Debug, Parser)]
#[command(
    name = "multinet",
    about = "meta plugin that delegates to other CNI plugins",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct RawEnvironment {
    #[arg(long)]
    command: Option<String>,
    #[arg(long)]
    container_id: Option<String>,
    #[arg(long)]
    netns: Option<String>,
    #[arg(long)]
    ifname: Option<String>,
    #[arg(long, default_value = "")]
    args: String,
    #[arg(long, default_value = "")]
    path: String,
}

/// Maps environment variable names onto the parser's long flags.
const VARIABLE_FLAGS: &[(&str, &str)] = &[
    ("CNI_COMMAND", "--command"),
    ("CNI_CONTAINERID", "--container-id"),
    ("CNI_NETNS", "--netns"),
    ("CNI_IFNAME", "--ifname"),
    ("CNI_ARGS", "--args"),
    ("CNI_PATH", "--path"),
];

/// Parsed `CNI_*` environment for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEnvironment {
    command: Command,
    container_id: Option<String>,
    netns: Option<String>,
    ifname: Option<String>,
    args: RuntimeArgs,
    path: Vec<Utf8PathBuf>,
}

impl PluginEnvironment {
    /// Parses an explicit set of `CNI_*` variables.
    ///
    /// Only the variables in `vars` are consulted; anything absent is unset
    /// even when the process environment carries it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Environment`] when `CNI_COMMAND` is missing or
    /// unknown, or [`ConfigError::RuntimeArgs`] when `CNI_ARGS` is malformed.
    pub fn from_vars<'a, I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut argv = vec![OsString::from("multinet")];
        for (key, value) in vars {
            if let Some((_, flag)) = VARIABLE_FLAGS.iter().find(|(name, _)| *name == key) {
                argv.push(OsString::from(format!("{flag}={value}")));
            }
        }
        Self::parse_from(argv)
    }

    fn parse_from(argv: Vec<OsString>) -> Result<Self, ConfigError> {
        let raw = RawEnvironment::try_parse_from(argv).map_err(|error| {
            ConfigError::Environment {
                message: error.to_string(),
            }
        })?;

        let command_text = raw.command.ok_or_else(|| ConfigError::Environment {
            message: String::from("CNI_COMMAND is not set"),
        })?;
        let command =
            command_text
                .parse::<Command>()
                .map_err(|_| ConfigError::Environment {
                    message: format!("unknown CNI_COMMAND '{command_text}'"),
                })?;

        Ok(Self {
            command,
            container_id: raw.container_id.filter(|value| !value.is_empty()),
            netns: raw.netns.filter(|value| !value.is_empty()),
            ifname: raw.ifname.filter(|value| !value.is_empty()),
            args: RuntimeArgs::parse(&raw.args)?,
            path: split_path(&raw.path),
        })
    }

    /// Requested operation.
    #[must_use]
    pub const fn command(&self) -> Command {
        self.command
    }

    /// Container identifier, if supplied.
    #[must_use]
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Network namespace path, if supplied.
    #[must_use]
    pub fn netns(&self) -> Option<&str> {
        self.netns.as_deref()
    }

    /// Caller-supplied primary interface name, if supplied.
    #[must_use]
    pub fn ifname(&self) -> Option<&str> {
        self.ifname.as_deref()
    }

    /// Parsed `CNI_ARGS`.
    #[must_use]
    pub const fn args(&self) -> &RuntimeArgs {
        &self.args
    }

    /// Directories listed in `CNI_PATH`, in order.
    #[must_use]
    pub fn path(&self) -> &[Utf8PathBuf] {
        &self.path
    }

    /// Returns the container identifier or a [`ConfigError::MissingVariable`].
    ///
    /// # Errors
    ///
    /// Fails when `CNI_CONTAINERID` was not set.
    pub fn require_container_id(&self) -> Result<&str, ConfigError> {
        self.require(self.container_id(), "CNI_CONTAINERID")
    }

    /// Returns the namespace path or a [`ConfigError::MissingVariable`].
    ///
    /// # Errors
    ///
    /// Fails when `CNI_NETNS` was not set.
    pub fn require_netns(&self) -> Result<&str, ConfigError> {
        self.require(self.netns(), "CNI_NETNS")
    }

    /// Returns the interface name or a [`ConfigError::MissingVariable`].
    ///
    /// # Errors
    ///
    /// Fails when `CNI_IFNAME` was not set.
    pub fn require_ifname(&self) -> Result<&str, ConfigError> {
        self.require(self.ifname(), "CNI_IFNAME")
    }

    fn require<'a>(
        &self,
        value: Option<&'a str>,
        variable: &'static str,
    ) -> Result<&'a str, ConfigError> {
        value.ok_or_else(|| ConfigError::MissingVariable {
            variable,
            command: self.command.to_string(),
        })
    }
}

fn split_path(raw: &str) -> Vec<Utf8PathBuf> {
    raw.split(':')
        .filter(|entry| !entry.is_empty())
        .map(Utf8PathBuf::from)
        .collect()
}

/// Keys understood in `CNI_ARGS` without `IgnoreUnknown`.
const KNOWN_KEYS: &[&str] = &[
    "IgnoreUnknown",
    "K8S_POD_NAMESPACE",
    "K8S_POD_NAME",
    "K8S_POD_INFRA_CONTAINER_ID",
    "K8S_POD_UID",
    "IP",
    "MAC",
];

/// Ordered `KEY=VALUE` pairs from `CNI_ARGS`.
///
/// ```
/// use multinet_config::RuntimeArgs;
///
/// let args = RuntimeArgs::parse("IgnoreUnknown=1;K8S_POD_NAME=web;K8S_POD_NAMESPACE=prod")
///     .expect("valid args");
/// assert_eq!(args.pod_name(), Some("web"));
/// assert_eq!(args.pod_namespace(), Some("prod"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeArgs {
    pairs: Vec<(String, String)>,
}

impl RuntimeArgs {
    /// Parses a `;`-separated `CNI_ARGS` string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RuntimeArgs`] for entries without `=` and for
    /// unknown keys when `IgnoreUnknown` is not truthy.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut pairs = Vec::new();
        for entry in raw.split(';').filter(|entry| !entry.is_empty()) {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(ConfigError::RuntimeArgs {
                    entry: entry.to_owned(),
                    reason: "expected KEY=VALUE",
                });
            };
            pairs.push((key.to_owned(), value.to_owned()));
        }

        let parsed = Self { pairs };
        if !parsed.ignore_unknown() {
            if let Some((key, value)) = parsed
                .pairs
                .iter()
                .find(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            {
                return Err(ConfigError::RuntimeArgs {
                    entry: format!("{key}={value}"),
                    reason: "unknown key and IgnoreUnknown is not set",
                });
            }
        }
        Ok(parsed)
    }

    /// Looks up the first value recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Pod namespace from `K8S_POD_NAMESPACE`.
    #[must_use]
    pub fn pod_namespace(&self) -> Option<&str> {
        self.non_empty("K8S_POD_NAMESPACE")
    }

    /// Pod name from `K8S_POD_NAME`.
    #[must_use]
    pub fn pod_name(&self) -> Option<&str> {
        self.non_empty("K8S_POD_NAME")
    }

    /// Sandbox container identifier from `K8S_POD_INFRA_CONTAINER_ID`.
    #[must_use]
    pub fn infra_container_id(&self) -> Option<&str> {
        self.non_empty("K8S_POD_INFRA_CONTAINER_ID")
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    fn ignore_unknown(&self) -> bool {
        self.get("IgnoreUnknown")
            .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true"))
    }
}
