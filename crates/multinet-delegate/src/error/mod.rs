//! Domain errors raised while running a delegate.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O and JSON errors are wrapped
//! in `Arc` so the error stays cheap to clone into aggregate reports.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from delegate parsing and execution.
#[derive(Debug, Clone, Error)]
pub enum DelegateError {
    /// The delegate configuration is neither a plugin nor a plugin list.
    #[error("invalid delegate configuration: {message}")]
    InvalidConfig {
        /// Description of the validation failure.
        message: String,
    },

    /// No executable for the plugin type exists in the search path.
    #[error("plugin '{plugin}' not found in {searched:?}")]
    PluginNotFound {
        /// Plugin type that was looked up.
        plugin: String,
        /// Directories that were searched.
        searched: Vec<PathBuf>,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{plugin}' failed to start: {source}")]
    SpawnFailed {
        /// Plugin type.
        plugin: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An I/O error occurred while exchanging data with the plugin.
    #[error("I/O error communicating with plugin '{plugin}': {source}")]
    Io {
        /// Plugin type.
        plugin: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin reported a structured protocol error.
    #[error("plugin '{plugin}' failed with code {code}: {message}")]
    PluginFailed {
        /// Plugin type.
        plugin: String,
        /// Protocol error code reported by the plugin.
        code: u32,
        /// Message reported by the plugin, including its details.
        message: String,
    },

    /// The plugin exited unsuccessfully without a parsable error document.
    #[error("plugin '{plugin}' exited with non-zero status {status}: {stderr}")]
    NonZeroExit {
        /// Plugin type.
        plugin: String,
        /// Process exit status, `-1` when terminated by a signal.
        status: i32,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The plugin printed output that is not a valid result.
    #[error("plugin '{plugin}' produced an invalid result: {message}")]
    InvalidResult {
        /// Plugin type.
        plugin: String,
        /// Description of the parse failure.
        message: String,
    },

    /// A configuration for a plugin-list entry could not be serialised.
    #[error("failed to serialise configuration for plugin '{plugin}': {source}")]
    Serialize {
        /// Plugin type.
        plugin: String,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The target interface already exists in the container namespace.
    #[error("interface '{ifname}' already exists in namespace {netns}")]
    InterfaceNameCollision {
        /// Interface name that was requested.
        ifname: String,
        /// Namespace that was inspected.
        netns: String,
    },

    /// The container network namespace is missing or cannot be opened.
    #[error("network namespace '{netns}' is unavailable: {message}")]
    NamespaceUnavailable {
        /// Namespace path.
        netns: String,
        /// Description of the failure.
        message: String,
    },

    /// The namespace exists but its interfaces could not be inspected.
    #[error("failed to inspect network namespace '{netns}': {message}")]
    NamespaceInspection {
        /// Namespace path.
        netns: String,
        /// Description of the failure.
        message: String,
    },
}

impl DelegateError {
    pub(crate) fn io(plugin: &str, source: std::io::Error) -> Self {
        Self::Io {
            plugin: plugin.to_owned(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn invalid_result(plugin: &str, message: impl Into<String>) -> Self {
        Self::InvalidResult {
            plugin: plugin.to_owned(),
            message: message.into(),
        }
    }
}
