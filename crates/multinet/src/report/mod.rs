//! Attachment status reporting.
//!
//! After a successful ADD the engine hands the per-delegate
//! [`NetworkStatus`] list to a [`StatusReporter`]. The production reporter
//! writes it into the pod's network-status annotation; failures are logged by
//! the engine and never undo the attachment.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use multinet_delegate::NetworkStatus;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::{ClusterError, NETWORK_STATUS_ANNOTATION, PodClient};

const REPORT_TARGET: &str = "multinet::report";

/// Errors raised while publishing attachment status.
#[derive(Debug, Clone, Error)]
pub enum StatusReportError {
    /// The status list could not be encoded.
    #[error("failed to encode network status: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The cluster API rejected a request.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Every attempt hit a concurrent modification.
    #[error("gave up updating pod {namespace}/{name} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        /// Pod namespace.
        namespace: String,
        /// Pod name.
        name: String,
        /// Attempts made.
        attempts: u32,
    },
}

/// Receives the status of every attachment made by one ADD.
pub trait StatusReporter {
    /// Publishes `statuses`.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusReportError`] when the status cannot be published.
    fn report(&self, statuses: &[NetworkStatus]) -> Result<(), StatusReportError>;
}

/// Retry schedule for conflicting updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    attempts: u32,
    initial: Duration,
    factor: u32,
}

impl Backoff {
    /// Creates a schedule of `attempts` tries, waiting `initial` after the
    /// first conflict and multiplying the wait by `factor` each time.
    #[must_use]
    pub fn new(attempts: u32, initial: Duration, factor: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            initial,
            factor,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(10), 5)
    }
}

/// Writes the status list into a pod annotation.
pub struct PodStatusReporter<C> {
    client: C,
    namespace: String,
    name: String,
    backoff: Backoff,
}

impl<C: PodClient> PodStatusReporter<C> {
    /// Creates a reporter for pod `namespace/name`.
    pub fn new(client: C, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            backoff: Backoff::default(),
        }
    }

    /// Replaces the conflict retry schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl<C: PodClient> StatusReporter for PodStatusReporter<C> {
    fn report(&self, statuses: &[NetworkStatus]) -> Result<(), StatusReportError> {
        let value = format_network_status(statuses).map_err(|source| StatusReportError::Encode {
            source: Arc::new(source),
        })?;
        let mut delay = self.backoff.initial;
        let mut pod = self.client.get_pod(&self.namespace, &self.name)?;

        for attempt in 1..=self.backoff.attempts {
            pod.set_annotation(NETWORK_STATUS_ANNOTATION, value.clone());
            match self.client.update_pod_status(&pod) {
                Ok(_) => {
                    info!(
                        target: REPORT_TARGET,
                        namespace = %self.namespace,
                        pod = %self.name,
                        networks = statuses.len(),
                        "reported network status"
                    );
                    return Ok(());
                }
                Err(ClusterError::Conflict { .. }) if attempt < self.backoff.attempts => {
                    debug!(
                        target: REPORT_TARGET,
                        namespace = %self.namespace,
                        pod = %self.name,
                        attempt,
                        "pod changed concurrently; retrying"
                    );
                    thread::sleep(delay);
                    delay = delay.saturating_mul(self.backoff.factor);
                    pod = self.client.get_pod(&self.namespace, &self.name)?;
                }
                Err(ClusterError::Conflict { .. }) => break,
                Err(error) => return Err(error.into()),
            }
        }

        Err(StatusReportError::ConflictRetriesExhausted {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            attempts: self.backoff.attempts,
        })
    }
}

/// Renders `statuses` as the annotation value.
///
/// Each entry is indented with four spaces and the entries are joined into a
/// JSON array. An empty list renders as the empty string.
///
/// # Errors
///
/// Returns the JSON error if a status cannot be serialised.
pub fn format_network_status(statuses: &[NetworkStatus]) -> Result<String, serde_json::Error> {
    if statuses.is_empty() {
        return Ok(String::new());
    }
    let mut entries = Vec::with_capacity(statuses.len());
    for status in statuses {
        let mut buffer = Vec::new();
        let mut serializer =
            Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        status.serialize(&mut serializer)?;
        entries.push(String::from_utf8_lossy(&buffer).into_owned());
    }
    Ok(format!("[{}]", entries.join(",")))
}
