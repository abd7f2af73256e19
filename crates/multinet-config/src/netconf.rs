//! Network configuration document read from stdin.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::defaults::{default_bin_dir, default_cni_dir, default_conf_dir, default_log_format};
use crate::error::ConfigError;
use crate::logging::{LogFormat, filter_for_level};

/// Top-level configuration of the meta plugin.
///
/// Only the fields the orchestration needs are modelled; everything else in
/// the document is ignored. Empty strings in path fields are treated as
/// absent so the defaults from [`crate::defaults`] apply.
///
/// ```
/// use multinet_config::NetConf;
///
/// let conf = NetConf::parse(br#"{"cniVersion":"0.3.1","name":"multinet","type":"multinet"}"#)
///     .expect("valid configuration");
/// assert_eq!(conf.bin_dir(), "/opt/cni/bin");
/// assert!(conf.kubeconfig().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConf {
    #[serde(default)]
    cni_version: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    plugin_type: String,
    #[serde(default = "default_conf_dir")]
    conf_dir: Utf8PathBuf,
    #[serde(default = "default_cni_dir")]
    cni_dir: Utf8PathBuf,
    #[serde(default = "default_bin_dir")]
    bin_dir: Utf8PathBuf,
    #[serde(default)]
    kubeconfig: Option<Utf8PathBuf>,
    #[serde(default)]
    log_file: Option<Utf8PathBuf>,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default = "default_log_format")]
    log_format: LogFormat,
    #[serde(default)]
    runtime_config: Option<Map<String, Value>>,
    #[serde(default)]
    default_delegates: Option<String>,
    #[serde(default)]
    delegates: Vec<Box<RawValue>>,
    #[serde(default)]
    prev_result: Option<Value>,
}

impl NetConf {
    /// Parses the stdin document and applies directory defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the bytes are not a JSON object
    /// matching the schema.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        let mut conf: Self = serde_json::from_slice(bytes).map_err(ConfigError::parse)?;
        if conf.conf_dir.as_str().is_empty() {
            conf.conf_dir = default_conf_dir();
        }
        if conf.cni_dir.as_str().is_empty() {
            conf.cni_dir = default_cni_dir();
        }
        if conf.bin_dir.as_str().is_empty() {
            conf.bin_dir = default_bin_dir();
        }
        Ok(conf)
    }

    /// Declared protocol version.
    #[must_use]
    pub fn cni_version(&self) -> &str {
        &self.cni_version
    }

    /// Network name of the meta plugin itself.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin type of the meta plugin itself.
    #[must_use]
    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    /// Directory searched for delegate network configurations.
    #[must_use]
    pub fn conf_dir(&self) -> &Utf8Path {
        &self.conf_dir
    }

    /// Directory holding persisted delegate records.
    #[must_use]
    pub fn cni_dir(&self) -> &Utf8Path {
        &self.cni_dir
    }

    /// Directory searched for delegate binaries after `CNI_PATH`.
    #[must_use]
    pub fn bin_dir(&self) -> &Utf8Path {
        &self.bin_dir
    }

    /// Cluster client configuration file, when configured.
    #[must_use]
    pub fn kubeconfig(&self) -> Option<&Utf8Path> {
        non_empty_path(self.kubeconfig.as_deref())
    }

    /// Log file path, when configured.
    #[must_use]
    pub fn log_file(&self) -> Option<&Utf8Path> {
        non_empty_path(self.log_file.as_deref())
    }

    /// Tracing filter derived from `logLevel`.
    #[must_use]
    pub fn log_filter(&self) -> String {
        filter_for_level(self.log_level.as_deref().unwrap_or_default())
    }

    /// Configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Capability arguments forwarded to delegates.
    #[must_use]
    pub const fn runtime_config(&self) -> Option<&Map<String, Value>> {
        self.runtime_config.as_ref()
    }

    /// Network selection naming delegates resolved from the config directory.
    #[must_use]
    pub fn default_delegates(&self) -> Option<&str> {
        self.default_delegates
            .as_deref()
            .filter(|value| !value.trim().is_empty())
    }

    /// Inline delegate configurations, in declaration order, as the exact
    /// text they had in the document.
    #[must_use]
    pub fn delegates(&self) -> &[Box<RawValue>] {
        &self.delegates
    }

    /// Result of a previous invocation passed back by the runtime.
    #[must_use]
    pub const fn prev_result(&self) -> Option<&Value> {
        self.prev_result.as_ref()
    }
}

fn non_empty_path(path: Option<&Utf8Path>) -> Option<&Utf8Path> {
    path.filter(|value| !value.as_str().is_empty())
}
