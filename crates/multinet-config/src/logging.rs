//! Logging options carried by the network configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::defaults::DEFAULT_LOG_FILTER;

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Translates a `logLevel` value into a `tracing` filter directive.
///
/// The configuration uses the level names common to CNI plugins; anything
/// unrecognised is passed through unchanged so full filter expressions such
/// as `multinet=debug,warn` keep working. An empty level yields the default.
///
/// ```
/// use multinet_config::logging::filter_for_level;
///
/// assert_eq!(filter_for_level("verbose"), "trace");
/// assert_eq!(filter_for_level("panic"), "error");
/// assert_eq!(filter_for_level(""), "info");
/// ```
#[must_use]
pub fn filter_for_level(level: &str) -> String {
    let trimmed = level.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => DEFAULT_LOG_FILTER.to_owned(),
        "verbose" => "trace".to_owned(),
        "warning" => "warn".to_owned(),
        "panic" => "error".to_owned(),
        "debug" | "info" | "warn" | "error" | "trace" => trimmed.to_ascii_lowercase(),
        _ => trimmed.to_owned(),
    }
}
