//! Structured telemetry initialisation for the plugin.
//!
//! stdout carries the protocol documents, so logs go to the configured
//! `logFile` or, failing that, to stderr.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use multinet_config::{LogFormat, NetConf};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to open the log file.
    #[error("failed to open log file {path}: {source}")]
    Open {
        /// Log file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first successful invocation installs
/// the global subscriber and later ones return a fresh [`TelemetryHandle`]
/// without touching the global state again.
///
/// # Examples
///
/// ```rust
/// use multinet::telemetry;
/// use multinet_config::NetConf;
///
/// # fn main() -> Result<(), multinet::telemetry::TelemetryError> {
/// let netconf = NetConf::parse(br#"{"cniVersion":"0.4.0","name":"n","type":"multinet"}"#)
///     .expect("netconf");
/// let first = telemetry::initialise(&netconf)?;
/// let second = telemetry::initialise(&netconf)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns a [`TelemetryError`] when the filter is invalid, the log file
/// cannot be opened, or another subscriber is already installed.
pub fn initialise(netconf: &NetConf) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(netconf))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(netconf: &NetConf) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(netconf.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let (writer, ansi) = match netconf.log_file() {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match netconf.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// Opens `path` for appending, creating it when missing.
fn open_log_file(path: &Utf8Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::Open {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })
}
