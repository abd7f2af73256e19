//! Default values applied when the network configuration omits a field.

use camino::Utf8PathBuf;

/// Directory holding the persisted delegate records.
pub const DEFAULT_CNI_DIR: &str = "/var/lib/cni/multinet";

/// Directory searched for network configuration files.
pub const DEFAULT_CONF_DIR: &str = "/etc/cni/net.d";

/// Directory searched for delegate plugin binaries.
pub const DEFAULT_BIN_DIR: &str = "/opt/cni/bin";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Protocol version reported by the VERSION command and used for empty results.
pub const CNI_VERSION: &str = "0.4.0";

/// Protocol versions this plugin accepts.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0"];

/// Default store directory as an owned path (used by serde defaults).
pub fn default_cni_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CNI_DIR)
}

/// Default configuration directory as an owned path.
pub fn default_conf_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CONF_DIR)
}

/// Default plugin binary directory as an owned path.
pub fn default_bin_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_BIN_DIR)
}

/// Default logging format.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
