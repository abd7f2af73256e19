//! Plugin execution protocol client.
//!
//! A plugin is an executable named after its `type`. It receives its
//! configuration on stdin and the invocation context through `CNI_*`
//! environment variables, and prints a result or an error document on stdout.
//! This module prepares those inputs for both delegate kinds and interprets
//! the output. Running the executable is left to a [`PluginExec`]
//! implementation so tests can substitute scripted plugins.
//!
//! Plugin lists run entry by entry. Each entry is given the list's `name` and
//! `cniVersion`, the capability arguments it declares, and on ADD the result
//! of the entry before it as `prevResult`.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::context::{InvocationContext, Operation};
use crate::error::DelegateError;
use crate::result::CniResult;

/// Tracing target for protocol operations.
const PROTOCOL_TARGET: &str = "multinet_delegate::protocol";

/// One execution of a plugin binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInvocation {
    plugin_type: String,
    plugin_dirs: Vec<PathBuf>,
    stdin: Vec<u8>,
    env: Vec<(String, String)>,
}

impl PluginInvocation {
    /// Creates an invocation of `plugin_type` for `operation` in `context`.
    #[must_use]
    pub fn new(
        plugin_type: impl Into<String>,
        stdin: Vec<u8>,
        operation: Operation,
        context: &InvocationContext,
    ) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            plugin_dirs: context.plugin_dirs().to_vec(),
            stdin,
            env: context.protocol_env(operation),
        }
    }

    /// Plugin type, which names the executable.
    #[must_use]
    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    /// Directories searched for the executable, in order.
    #[must_use]
    pub fn plugin_dirs(&self) -> &[PathBuf] {
        &self.plugin_dirs
    }

    /// Configuration written to the plugin's stdin.
    #[must_use]
    pub fn stdin(&self) -> &[u8] {
        &self.stdin
    }

    /// Protocol environment of the child process.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Looks up one protocol variable.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Trait abstracting plugin process execution for testability.
///
/// The production implementation is
/// [`ProcessExec`](crate::process::ProcessExec), which spawns the plugin
/// binary. Test code implements this trait to script plugin behaviour.
///
/// # Example
///
/// ```
/// use multinet_delegate::{DelegateError, PluginExec, PluginInvocation};
///
/// struct Loopback;
///
/// impl PluginExec for Loopback {
///     fn exec(&self, _invocation: &PluginInvocation) -> Result<Vec<u8>, DelegateError> {
///         Ok(br#"{"cniVersion":"0.4.0"}"#.to_vec())
///     }
/// }
/// ```
pub trait PluginExec {
    /// Runs the plugin and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegateError`] if the plugin cannot be found or spawned,
    /// or if it reports a failure.
    fn exec(&self, invocation: &PluginInvocation) -> Result<Vec<u8>, DelegateError>;
}

impl<T: PluginExec + ?Sized> PluginExec for &T {
    fn exec(&self, invocation: &PluginInvocation) -> Result<Vec<u8>, DelegateError> {
        (**self).exec(invocation)
    }
}

/// Runs ADD for a single plugin with its configuration passed verbatim.
///
/// # Errors
///
/// Returns the execution error or [`DelegateError::InvalidResult`] when the
/// plugin output is not a result document.
pub fn add_single(
    exec: &impl PluginExec,
    plugin_type: &str,
    config: &[u8],
    context: &InvocationContext,
) -> Result<CniResult, DelegateError> {
    let invocation = PluginInvocation::new(plugin_type, config.to_vec(), Operation::Add, context);
    let stdout = exec.exec(&invocation)?;
    parse_result(plugin_type, &stdout)
}

/// Runs DEL for a single plugin with its configuration passed verbatim.
///
/// # Errors
///
/// Returns the execution error.
pub fn del_single(
    exec: &impl PluginExec,
    plugin_type: &str,
    config: &[u8],
    context: &InvocationContext,
) -> Result<(), DelegateError> {
    let invocation = PluginInvocation::new(plugin_type, config.to_vec(), Operation::Del, context);
    exec.exec(&invocation).map(drop)
}

/// Runs ADD for every entry of a plugin list, in order.
///
/// Returns the result of the last entry.
///
/// # Errors
///
/// Returns the first entry failure, or [`DelegateError::InvalidConfig`] when
/// the list is malformed.
pub fn add_list(
    exec: &impl PluginExec,
    config: &[u8],
    context: &InvocationContext,
) -> Result<CniResult, DelegateError> {
    let list = PluginList::parse(config)?;
    let mut previous: Option<CniResult> = None;

    for entry in &list.entries {
        let plugin_type = entry_type(entry)?;
        let stdin = build_entry_config(
            entry,
            &list.name,
            &list.cni_version,
            previous.as_ref(),
            context.capability_args(),
        )?;
        debug!(
            target: PROTOCOL_TARGET,
            list = list.name.as_str(),
            plugin = plugin_type,
            "adding plugin list entry"
        );
        let invocation = PluginInvocation::new(plugin_type, stdin, Operation::Add, context);
        let stdout = exec.exec(&invocation)?;
        previous = Some(parse_result(plugin_type, &stdout)?);
    }

    Ok(previous.unwrap_or_else(|| CniResult::empty(list.cni_version)))
}

/// Runs DEL for every entry of a plugin list, in reverse order.
///
/// # Errors
///
/// Returns the first entry failure; later entries are not attempted.
pub fn del_list(
    exec: &impl PluginExec,
    config: &[u8],
    context: &InvocationContext,
) -> Result<(), DelegateError> {
    let list = PluginList::parse(config)?;

    for entry in list.entries.iter().rev() {
        let plugin_type = entry_type(entry)?;
        let stdin = build_entry_config(
            entry,
            &list.name,
            &list.cni_version,
            None,
            context.capability_args(),
        )?;
        debug!(
            target: PROTOCOL_TARGET,
            list = list.name.as_str(),
            plugin = plugin_type,
            "deleting plugin list entry"
        );
        let invocation = PluginInvocation::new(plugin_type, stdin, Operation::Del, context);
        exec.exec(&invocation)?;
    }

    Ok(())
}

/// Builds the stdin configuration for one plugin-list entry.
///
/// Only the capability arguments whose key the entry enables under
/// `capabilities` are injected, as `runtimeConfig`.
///
/// # Errors
///
/// Returns [`DelegateError::InvalidConfig`] if the entry is not an object or
/// [`DelegateError::Serialize`] if the result cannot be encoded.
pub fn build_entry_config(
    entry: &Value,
    list_name: &str,
    cni_version: &str,
    previous: Option<&CniResult>,
    capability_args: Option<&Map<String, Value>>,
) -> Result<Vec<u8>, DelegateError> {
    let plugin = entry_type(entry)?;
    let Some(mut config) = entry.as_object().cloned() else {
        return Err(DelegateError::InvalidConfig {
            message: format!("entry '{plugin}' of plugin list '{list_name}' is not an object"),
        });
    };
    let serialize_error = |source| DelegateError::Serialize {
        plugin: plugin.to_owned(),
        source: Arc::new(source),
    };

    config.insert(String::from("name"), Value::from(list_name));
    config.insert(String::from("cniVersion"), Value::from(cni_version));
    if let Some(previous) = previous {
        let value = serde_json::to_value(previous).map_err(serialize_error)?;
        config.insert(String::from("prevResult"), value);
    }

    let runtime_config = declared_capabilities(&config, capability_args);
    if !runtime_config.is_empty() {
        config.insert(String::from("runtimeConfig"), Value::Object(runtime_config));
    }

    serde_json::to_vec(&config).map_err(serialize_error)
}

fn declared_capabilities(
    config: &Map<String, Value>,
    capability_args: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let (Some(declared), Some(args)) = (
        config.get("capabilities").and_then(Value::as_object),
        capability_args,
    ) else {
        return Map::new();
    };

    args.iter()
        .filter(|(key, _)| declared.get(*key).and_then(Value::as_bool) == Some(true))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

struct PluginList {
    name: String,
    cni_version: String,
    entries: Vec<Value>,
}

impl PluginList {
    fn parse(config: &[u8]) -> Result<Self, DelegateError> {
        let document: Value =
            serde_json::from_slice(config).map_err(|error| DelegateError::InvalidConfig {
                message: error.to_string(),
            })?;
        let text = |key: &str| {
            document
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let name = text("name");
        let cni_version = text("cniVersion");
        let entries = document
            .get("plugins")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| DelegateError::InvalidConfig {
                message: format!("plugin list '{name}' has no 'plugins' array"),
            })?;
        Ok(Self {
            name,
            cni_version,
            entries,
        })
    }
}

fn entry_type(entry: &Value) -> Result<&str, DelegateError> {
    entry
        .get("type")
        .and_then(Value::as_str)
        .filter(|plugin_type| !plugin_type.is_empty())
        .ok_or_else(|| DelegateError::InvalidConfig {
            message: String::from("plugin list entry has no 'type' field"),
        })
}

fn parse_result(plugin_type: &str, stdout: &[u8]) -> Result<CniResult, DelegateError> {
    CniResult::from_slice(stdout)
        .map_err(|error| DelegateError::invalid_result(plugin_type, error.to_string()))
}

#[cfg(test)]
mod tests;
