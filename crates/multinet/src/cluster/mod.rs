//! Minimal cluster API surface.
//!
//! Only pods are read and written: the networks annotation selects extra
//! attachments and the network-status annotation reports them back. The
//! [`PodClient`] trait is the seam between the resolver or status reporter
//! and the HTTP client in [`client`], so both can be tested without a cluster.

pub mod client;
pub mod kubeconfig;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use client::KubeClient;
pub use kubeconfig::{Connection, discover_connection};

/// Pod annotation selecting additional networks.
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// Pod annotation carrying the attachment status list.
pub const NETWORK_STATUS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/network-status";

/// Errors raised while talking to the cluster API.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// The client configuration is unusable.
    #[error("invalid cluster client configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// A credential or configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The kubeconfig file is not valid YAML.
    #[error("failed to parse kubeconfig {path}: {source}")]
    Kubeconfig {
        /// File path.
        path: Utf8PathBuf,
        /// Underlying YAML error.
        #[source]
        source: Arc<serde_yaml::Error>,
    },

    /// Embedded credential data is not valid base64.
    #[error("field '{field}' is not valid base64: {source}")]
    Base64 {
        /// Kubeconfig field name.
        field: &'static str,
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },

    /// The HTTP request failed.
    #[error("cluster request failed: {source}")]
    Http {
        /// Underlying transport error.
        #[source]
        source: Arc<reqwest::Error>,
    },

    /// The pod changed since it was read.
    #[error("pod {namespace}/{name} was modified concurrently")]
    Conflict {
        /// Pod namespace.
        namespace: String,
        /// Pod name.
        name: String,
    },

    /// The API server answered with an error status.
    #[error("cluster API returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The response body is not a pod object.
    #[error("failed to decode pod object: {source}")]
    Decode {
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl From<reqwest::Error> for ClusterError {
    fn from(source: reqwest::Error) -> Self {
        Self::Http {
            source: Arc::new(source),
        }
    }
}

/// Pod object as exchanged with the API server.
///
/// Fields other than the metadata used here are carried through untouched so
/// a status update does not drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    /// Object metadata.
    #[serde(default)]
    pub metadata: PodMetadata,
    /// Remaining fields (`spec`, `status`, ...).
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Subset of object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMetadata {
    /// Pod name.
    #[serde(default)]
    pub name: String,
    /// Pod namespace.
    #[serde(default)]
    pub namespace: String,
    /// Pod annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Remaining metadata fields, including `resourceVersion`.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Pod {
    /// Returns the value of annotation `key`.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Sets annotation `key` to `value`.
    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.annotations.insert(key.to_owned(), value.into());
    }
}

/// Reads and updates pods.
pub trait PodClient {
    /// Fetches the pod `namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] when the request fails.
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;

    /// Writes `pod` back through the status subresource.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Conflict`] when the pod changed since it was
    /// read, or another [`ClusterError`] when the request fails.
    fn update_pod_status(&self, pod: &Pod) -> Result<Pod, ClusterError>;
}

impl<T: PodClient + ?Sized> PodClient for &T {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        (**self).get_pod(namespace, name)
    }

    fn update_pod_status(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        (**self).update_pod_status(pod)
    }
}
