//! Lookup of named networks in the configuration directory.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;

const CONF_DIR_TARGET: &str = "multinet_config::conf_dir";

/// File suffixes considered network configurations.
const CONFIG_EXTENSIONS: &[&str] = &["conf", "json", "conflist"];

/// Returns the raw bytes of the configuration in `dir` whose `name` matches.
///
/// Candidate files are visited in lexical order. Single-plugin files
/// (`.conf`, `.json`) must declare a `type`; list files (`.conflist`) are
/// returned as-is once their name matches.
///
/// # Errors
///
/// Returns [`ConfigError::NoNetworks`] when the directory is unreadable or
/// holds no candidates, [`ConfigError::File`] when a candidate cannot be read
/// or parsed, and [`ConfigError::NetworkNotFound`] when no candidate matches.
pub fn find_network_config(dir: &Utf8Path, name: &str) -> Result<Vec<u8>, ConfigError> {
    let files = config_files(dir)?;
    debug!(
        target: CONF_DIR_TARGET,
        dir = %dir,
        network = name,
        candidates = files.len(),
        "searching configuration directory"
    );

    for path in files {
        let bytes = fs::read(&path).map_err(|error| ConfigError::File {
            path: path.clone(),
            message: error.to_string(),
        })?;
        let document: Value = serde_json::from_slice(&bytes).map_err(|error| ConfigError::File {
            path: path.clone(),
            message: error.to_string(),
        })?;

        if document.get("name").and_then(Value::as_str) != Some(name) {
            continue;
        }

        let is_list = path.extension() == Some("conflist");
        if !is_list && document.get("type").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err(ConfigError::File {
                path,
                message: String::from("no 'type'; perhaps this is a .conflist?"),
            });
        }
        return Ok(bytes);
    }

    Err(ConfigError::NetworkNotFound {
        name: name.to_owned(),
        dir: dir.to_path_buf(),
    })
}

fn config_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ConfigError> {
    let no_networks = || ConfigError::NoNetworks {
        dir: dir.to_path_buf(),
    };
    let entries = dir.read_dir_utf8().map_err(|_| no_networks())?;

    let mut files: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|extension| CONFIG_EXTENSIONS.contains(&extension))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(no_networks());
    }
    Ok(files)
}
