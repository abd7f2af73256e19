//! Errors raised while reading plugin configuration.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while loading the environment or the network configuration.
///
/// Every variant is fatal for the current invocation and is raised before any
/// delegate has been touched.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The `CNI_*` environment could not be parsed.
    #[error("invalid plugin environment: {message}")]
    Environment {
        /// Parser diagnostic.
        message: String,
    },

    /// A variable required by the requested command was not set.
    #[error("required environment variable {variable} is missing for {command}")]
    MissingVariable {
        /// Name of the missing variable.
        variable: &'static str,
        /// Command that requires it.
        command: String,
    },

    /// `CNI_ARGS` contained a malformed or unexpected pair.
    #[error("invalid CNI_ARGS entry '{entry}': {reason}")]
    RuntimeArgs {
        /// Offending `KEY=VALUE` entry.
        entry: String,
        /// Why the entry was rejected.
        reason: &'static str,
    },

    /// The network configuration document is not valid JSON for the schema.
    #[error("failed to parse network configuration: {source}")]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A network selection string could not be parsed.
    #[error("invalid network selection '{selection}': {reason}")]
    Selection {
        /// Selection text that failed to parse.
        selection: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration directory could not be listed or held no networks.
    #[error("no networks found in {dir}")]
    NoNetworks {
        /// Directory that was searched.
        dir: Utf8PathBuf,
    },

    /// A configuration file could not be read or parsed.
    #[error("failed to load network configuration file {path}: {message}")]
    File {
        /// File that failed.
        path: Utf8PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// No file in the configuration directory declares the requested network.
    #[error("no network named '{name}' in {dir}")]
    NetworkNotFound {
        /// Requested network name.
        name: String,
        /// Directory that was searched.
        dir: Utf8PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn parse(source: serde_json::Error) -> Self {
        Self::Parse {
            source: Arc::new(source),
        }
    }

    pub(crate) fn selection(selection: &str, reason: impl Into<String>) -> Self {
        Self::Selection {
            selection: selection.to_owned(),
            reason: reason.into(),
        }
    }
}
